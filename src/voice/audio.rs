//! Phrase endpointing over mono PCM.
//!
//! [`PhraseDetector`] sets a speech threshold from the first moments of
//! ambient noise, waits for energy above it, and closes the phrase once the
//! speaker has paused long enough. It knows nothing about devices, so it is
//! fed the same way from a live microphone or from a test buffer.
use std::collections::VecDeque;

use crate::config::MicrophoneConfig;

const FRAME_MS: u32 = 30;
/// Audio kept from just before the threshold was crossed, so soft onsets survive.
const PRE_ROLL_FRAMES: usize = 10;

/// One recorded phrase, mono samples in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate.max(1))
    }

    /// 16-bit PCM mono WAV.
    pub fn to_wav(&self) -> Vec<u8> {
        let data_len = (self.samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&(self.sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Calibrating { frames: u32, energy_sum: f32 },
    Waiting,
    Speaking { voiced_ms: u32, silent_ms: u32 },
}

pub struct PhraseDetector {
    sample_rate: u32,
    frame_len: usize,
    calibration_frames: u32,
    pause_ms: u32,
    phrase_min_ms: u32,
    max_phrase_ms: u32,
    energy_ratio: f32,
    min_energy: f32,
    threshold: f32,
    phase: Phase,
    partial: Vec<f32>,
    pre_roll: VecDeque<Vec<f32>>,
    phrase: Vec<f32>,
}

impl PhraseDetector {
    pub fn new(config: &MicrophoneConfig, sample_rate: u32) -> Self {
        let calibration_frames = config.ambient_ms.div_ceil(FRAME_MS);
        let phase = if calibration_frames == 0 {
            Phase::Waiting
        } else {
            Phase::Calibrating {
                frames: 0,
                energy_sum: 0.0,
            }
        };
        Self {
            sample_rate: sample_rate.max(1),
            frame_len: ((sample_rate * FRAME_MS / 1000) as usize).max(1),
            calibration_frames,
            pause_ms: config.pause_threshold_ms,
            phrase_min_ms: config.phrase_min_ms,
            max_phrase_ms: config.max_phrase_ms,
            energy_ratio: config.energy_ratio,
            min_energy: config.min_energy,
            threshold: config.min_energy,
            phase,
            partial: Vec::new(),
            pre_roll: VecDeque::with_capacity(PRE_ROLL_FRAMES + 1),
            phrase: Vec::new(),
        }
    }

    /// Current speech threshold; the configured floor until calibration ends.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feeds captured samples of any length. Returns the phrase once a pause
    /// closes it.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.partial.extend_from_slice(samples);
        let mut offset = 0;
        let mut finished = None;
        while finished.is_none() && self.partial.len() - offset >= self.frame_len {
            let frame = self.partial[offset..offset + self.frame_len].to_vec();
            offset += self.frame_len;
            finished = self.push_frame(frame);
        }
        self.partial.drain(..offset);
        finished
    }

    fn push_frame(&mut self, frame: Vec<f32>) -> Option<Vec<f32>> {
        let energy = rms(&frame);
        match self.phase {
            Phase::Calibrating { frames, energy_sum } => {
                let frames = frames + 1;
                let energy_sum = energy_sum + energy;
                if frames < self.calibration_frames {
                    self.phase = Phase::Calibrating { frames, energy_sum };
                } else {
                    let ambient = energy_sum / frames as f32;
                    self.threshold = (ambient * self.energy_ratio).max(self.min_energy);
                    tracing::debug!(ambient, threshold = self.threshold, "ambient noise calibrated");
                    self.phase = Phase::Waiting;
                }
                None
            }
            Phase::Waiting => {
                if energy > self.threshold {
                    self.phrase = self.pre_roll.drain(..).flatten().collect();
                    self.phrase.extend_from_slice(&frame);
                    self.phase = Phase::Speaking {
                        voiced_ms: FRAME_MS,
                        silent_ms: 0,
                    };
                } else {
                    self.pre_roll.push_back(frame);
                    if self.pre_roll.len() > PRE_ROLL_FRAMES {
                        self.pre_roll.pop_front();
                    }
                }
                None
            }
            Phase::Speaking {
                mut voiced_ms,
                mut silent_ms,
            } => {
                self.phrase.extend_from_slice(&frame);
                if energy > self.threshold {
                    voiced_ms += FRAME_MS;
                    silent_ms = 0;
                } else {
                    silent_ms += FRAME_MS;
                }

                let total_ms = self.phrase.len() as u64 * 1000 / u64::from(self.sample_rate);
                if silent_ms < self.pause_ms && total_ms < u64::from(self.max_phrase_ms) {
                    self.phase = Phase::Speaking {
                        voiced_ms,
                        silent_ms,
                    };
                    return None;
                }

                self.phase = Phase::Waiting;
                if voiced_ms < self.phrase_min_ms {
                    tracing::debug!(voiced_ms, "sound too short for a phrase, ignored");
                    self.phrase.clear();
                    return None;
                }
                Some(std::mem::take(&mut self.phrase))
            }
        }
    }
}
