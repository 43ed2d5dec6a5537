use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::voice::audio::Utterance;
use crate::voice::command::normalize;
use crate::voice::transcribe::Transcriber;

/// Source of transcribed voice commands.
#[async_trait]
pub trait CommandListener: Send {
    /// Blocks until one phrase is available.
    ///
    /// `Ok(None)` means nothing usable was recognised; the caller just
    /// listens again. [`VoxPlayError::InputClosed`] means no more commands
    /// will ever arrive.
    async fn listen(&mut self) -> VoxPlayResult<Option<String>>;
}

fn log_command(command: Option<&str>) {
    match command {
        Some(c) => tracing::info!(command = %c, "command heard"),
        None => tracing::info!("nothing recognised"),
    }
}

/// Spoken phrases, one per call, each closed by a pause.
#[async_trait]
pub trait PhraseSource: Send {
    async fn next_phrase(&mut self) -> VoxPlayResult<Utterance>;
}

/// Records a phrase and transcribes it.
pub struct SpeechListener {
    source: Box<dyn PhraseSource>,
    transcriber: Box<dyn Transcriber>,
}

impl SpeechListener {
    pub fn new(source: Box<dyn PhraseSource>, transcriber: Box<dyn Transcriber>) -> Self {
        Self {
            source,
            transcriber,
        }
    }
}

#[async_trait]
impl CommandListener for SpeechListener {
    async fn listen(&mut self) -> VoxPlayResult<Option<String>> {
        tracing::info!("listening for a command");
        let utterance = self.source.next_phrase().await?;
        tracing::debug!(duration_ms = utterance.duration_ms(), "phrase recorded");
        let command = self
            .transcriber
            .transcribe(&utterance)
            .await?
            .as_deref()
            .and_then(normalize);
        log_command(command.as_deref());
        Ok(command)
    }
}

/// Reads one transcription per line, e.g. piped from an external
/// speech-to-text process.
pub struct LineListener<R> {
    lines: Lines<R>,
}

pub type ConsoleListener = LineListener<BufReader<Stdin>>;

impl ConsoleListener {
    pub fn stdin() -> Self {
        LineListener::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineListener<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> CommandListener for LineListener<R> {
    async fn listen(&mut self) -> VoxPlayResult<Option<String>> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| VoxPlayError::Voice(format!("read command: {e}")))?;
        match line {
            Some(text) => {
                let command = normalize(&text);
                log_command(command.as_deref());
                Ok(command)
            }
            None => Err(VoxPlayError::InputClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct RecordedPhrases(VecDeque<VoxPlayResult<Utterance>>);

    #[async_trait]
    impl PhraseSource for RecordedPhrases {
        async fn next_phrase(&mut self) -> VoxPlayResult<Utterance> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(VoxPlayError::Voice("device unplugged".into())))
        }
    }

    /// Treats the first sample as an index into a fixed phrase list.
    struct IndexTranscriber;

    #[async_trait]
    impl Transcriber for IndexTranscriber {
        async fn transcribe(&self, utterance: &Utterance) -> VoxPlayResult<Option<String>> {
            match utterance.samples.first().copied().unwrap_or(0.0) as i32 {
                1 => Ok(Some("  Skeletons On The PRINCE ".into())),
                2 => Ok(None),
                _ => Err(VoxPlayError::Voice("transcription request failed: timeout".into())),
            }
        }
    }

    fn clip(index: f32) -> VoxPlayResult<Utterance> {
        Ok(Utterance {
            sample_rate: 16_000,
            samples: vec![index],
        })
    }

    #[tokio::test]
    async fn speech_is_transcribed_and_normalised() {
        let source = RecordedPhrases(VecDeque::from([clip(1.0), clip(2.0), clip(3.0)]));
        let mut listener = SpeechListener::new(Box::new(source), Box::new(IndexTranscriber));

        assert_eq!(
            listener.listen().await.unwrap().as_deref(),
            Some("skeletons on the prince")
        );
        assert_eq!(listener.listen().await.unwrap(), None);
        assert!(matches!(listener.listen().await, Err(VoxPlayError::Voice(_))));
        // A capture failure is transient, not the end of input.
        assert!(matches!(listener.listen().await, Err(VoxPlayError::Voice(_))));
    }

    #[tokio::test]
    async fn yields_normalised_lines_then_closes() {
        let input: &[u8] = b"Play Giant LEFT\n\n  hog bridge  \n";
        let mut listener = LineListener::new(BufReader::new(input));
        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("play giant left"));
        assert_eq!(listener.listen().await.unwrap(), None);
        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("hog bridge"));
        assert!(matches!(listener.listen().await, Err(VoxPlayError::InputClosed)));
    }
}
