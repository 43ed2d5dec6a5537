use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{VoxPlayError, VoxPlayResult};

/// Slack allowed when checking that a relative rectangle stays inside the window.
const RELATIVE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Matched case-insensitively as a substring of the window title.
    #[serde(default = "default_window_title")]
    pub window_title: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
        }
    }
}

fn default_window_title() -> String {
    "Clash Royale".to_string()
}

/// Where the card slots and the playable grid sit on the window surface,
/// as fractions of the window's width and height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    #[serde(default = "default_board_cols")]
    pub board_cols: u32,
    #[serde(default = "default_board_rows")]
    pub board_rows: u32,
    #[serde(default = "default_card_slots")]
    pub card_slots: Vec<CardSlot>,
    #[serde(default)]
    pub playable_area: RelativeRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardSlot {
    pub slot: u8,
    /// Relative centre of the card, 0.0–1.0 of the window width.
    pub x: f64,
    /// Relative centre of the card, 0.0–1.0 of the window height.
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    pub x_start: f64,
    pub y_start: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for RelativeRect {
    /// Calibrated against an 828x1374 window: 128px/167px offset, 649x873 span.
    fn default() -> Self {
        Self {
            x_start: 0.1546,
            y_start: 0.1215,
            width: 0.7838,
            height: 0.6354,
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            board_cols: default_board_cols(),
            board_rows: default_board_rows(),
            card_slots: default_card_slots(),
            playable_area: RelativeRect::default(),
        }
    }
}

fn default_board_cols() -> u32 {
    18
}

fn default_board_rows() -> u32 {
    28
}

fn default_card_slots() -> Vec<CardSlot> {
    vec![
        CardSlot { slot: 1, x: 0.3792, y: 0.8934 },
        CardSlot { slot: 2, x: 0.5501, y: 0.8926 },
        CardSlot { slot: 3, x: 0.7162, y: 0.8941 },
        CardSlot { slot: 4, x: 0.8919, y: 0.8890 },
    ]
}

impl GeometryConfig {
    pub const MIN_SLOT: u8 = 1;
    pub const MAX_SLOT: u8 = 4;

    pub fn card_slot(&self, slot: u8) -> Option<&CardSlot> {
        self.card_slots.iter().find(|c| c.slot == slot)
    }

    /// Rejects geometry that would place clicks outside the window.
    /// Misconfigured values are reported, never clamped.
    pub fn validate(&self) -> VoxPlayResult<()> {
        if self.board_cols == 0 || self.board_rows == 0 {
            return Err(VoxPlayError::Config(format!(
                "geometry board must be at least 1x1, got {}x{}",
                self.board_cols, self.board_rows
            )));
        }

        let area = &self.playable_area;
        check_unit("playable_area.x_start", area.x_start)?;
        check_unit("playable_area.y_start", area.y_start)?;
        check_unit("playable_area.width", area.width)?;
        check_unit("playable_area.height", area.height)?;
        if area.x_start + area.width > 1.0 + RELATIVE_EPSILON {
            return Err(VoxPlayError::Config(format!(
                "playable_area.x_start + width = {} exceeds 1.0",
                area.x_start + area.width
            )));
        }
        if area.y_start + area.height > 1.0 + RELATIVE_EPSILON {
            return Err(VoxPlayError::Config(format!(
                "playable_area.y_start + height = {} exceeds 1.0",
                area.y_start + area.height
            )));
        }

        let mut seen = BTreeSet::new();
        for card in &self.card_slots {
            if !(Self::MIN_SLOT..=Self::MAX_SLOT).contains(&card.slot) {
                return Err(VoxPlayError::Config(format!(
                    "card slot id {} outside {}..={}",
                    card.slot,
                    Self::MIN_SLOT,
                    Self::MAX_SLOT
                )));
            }
            if !seen.insert(card.slot) {
                return Err(VoxPlayError::Config(format!(
                    "card slot {} configured more than once",
                    card.slot
                )));
            }
            check_unit(&format!("card_slots[{}].x", card.slot), card.x)?;
            check_unit(&format!("card_slots[{}].y", card.slot), card.y)?;
        }
        if seen.len() != usize::from(Self::MAX_SLOT) {
            let missing: Vec<u8> = (Self::MIN_SLOT..=Self::MAX_SLOT)
                .filter(|s| !seen.contains(s))
                .collect();
            return Err(VoxPlayError::Config(format!(
                "card slots {missing:?} are not configured"
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> VoxPlayResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(VoxPlayError::Config(format!(
            "{name} = {value} is outside [0.0, 1.0]"
        )))
    }
}

/// Pointer pacing between the card click and the board click.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_move_duration_ms")]
    pub move_duration_ms: u64,
    #[serde(default = "default_click_gap_ms")]
    pub click_gap_ms: u64,
    /// Pause after every full cycle before listening again.
    #[serde(default = "default_cycle_pause_ms")]
    pub cycle_pause_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            move_duration_ms: default_move_duration_ms(),
            click_gap_ms: default_click_gap_ms(),
            cycle_pause_ms: default_cycle_pause_ms(),
        }
    }
}

fn default_move_duration_ms() -> u64 {
    150
}

fn default_click_gap_ms() -> u64 {
    200
}

fn default_cycle_pause_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,
    #[serde(default)]
    pub input: CommandInput,
    /// Model used to transcribe recorded phrases; the active provider's
    /// model when unset.
    #[serde(default)]
    pub transcription_model: Option<String>,
    #[serde(default)]
    pub microphone: MicrophoneConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stop_phrases: default_stop_phrases(),
            input: CommandInput::default(),
            transcription_model: None,
            microphone: MicrophoneConfig::default(),
        }
    }
}

fn default_stop_phrases() -> Vec<String> {
    vec!["stop program".to_string(), "exit program".to_string()]
}

/// Where spoken commands come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandInput {
    /// Record from an input device and transcribe through the model provider.
    #[default]
    Microphone,
    /// One already-transcribed command per line on stdin.
    Stdin,
}

/// Phrase endpointing for microphone input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrophoneConfig {
    /// Substring of the input device name; the system default when unset.
    #[serde(default)]
    pub device: Option<String>,
    /// Noise sampled before each phrase to set the speech threshold.
    #[serde(default = "default_ambient_ms")]
    pub ambient_ms: u32,
    /// Silence that ends a phrase.
    #[serde(default = "default_pause_threshold_ms")]
    pub pause_threshold_ms: u32,
    /// Speech threshold as a multiple of the ambient RMS energy.
    #[serde(default = "default_energy_ratio")]
    pub energy_ratio: f32,
    /// Floor for the speech threshold, RMS of samples in [-1, 1].
    #[serde(default = "default_min_energy")]
    pub min_energy: f32,
    /// Voiced time below which a phrase is dropped as a click or cough.
    #[serde(default = "default_phrase_min_ms")]
    pub phrase_min_ms: u32,
    #[serde(default = "default_max_phrase_ms")]
    pub max_phrase_ms: u32,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            device: None,
            ambient_ms: default_ambient_ms(),
            pause_threshold_ms: default_pause_threshold_ms(),
            energy_ratio: default_energy_ratio(),
            min_energy: default_min_energy(),
            phrase_min_ms: default_phrase_min_ms(),
            max_phrase_ms: default_max_phrase_ms(),
        }
    }
}

fn default_ambient_ms() -> u32 {
    1000
}

fn default_pause_threshold_ms() -> u32 {
    1000
}

fn default_energy_ratio() -> f32 {
    1.5
}

fn default_min_energy() -> f32 {
    0.01
}

fn default_phrase_min_ms() -> u32 {
    300
}

fn default_max_phrase_ms() -> u32 {
    15_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_active_provider")]
    pub active_provider: String,
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active_provider: default_active_provider(),
            providers: default_providers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions URL of an OpenAI-compatible endpoint.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Upper bound on one request, connect through last body byte.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Falls back to env vars `VOXPLAY_<ID>_API_KEY`, then `GEMINI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_active_provider() -> String {
    "gemini".to_string()
}

fn default_providers() -> HashMap<String, ProviderEntry> {
    let mut providers = HashMap::new();
    providers.insert(
        "gemini".to_string(),
        ProviderEntry {
            display_name: "Google Gemini".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        },
    );
    providers
}

fn default_temperature() -> f64 {
    0.1
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> VoxPlayResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.geometry.validate()?;
        Ok(config)
    }
}

fn resolve_config_path() -> VoxPlayResult<Option<PathBuf>> {
    if let Ok(explicit) = std::env::var("VOXPLAY_CONFIG") {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(VoxPlayError::Config(format!(
            "VOXPLAY_CONFIG points to missing file {}",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("voxplay").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

pub fn load_config() -> VoxPlayResult<AppConfig> {
    let Some(path) = resolve_config_path()? else {
        tracing::warn!("config.toml not found, using built-in calibration");
        let config = AppConfig::default();
        config.geometry.validate()?;
        return Ok(config);
    };
    let content = std::fs::read_to_string(&path)?;
    let config = AppConfig::from_toml_str(&content)?;
    tracing::info!(
        path = %path.display(),
        window = %config.game.window_title,
        provider = %config.llm.active_provider,
        "config loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_calibrated_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.geometry, GeometryConfig::default());
        assert_eq!(config.game.window_title, "Clash Royale");
        assert_eq!(config.playback.move_duration_ms, 150);
        assert_eq!(config.playback.click_gap_ms, 200);
        assert_eq!(config.llm.active_provider, "gemini");
        assert!(config.llm.providers.contains_key("gemini"));
    }

    #[test]
    fn parses_custom_geometry() {
        let doc = r#"
            [game]
            window_title = "Arena"

            [geometry]
            board_cols = 10
            board_rows = 20

            [[geometry.card_slots]]
            slot = 1
            x = 0.1
            y = 0.9

            [[geometry.card_slots]]
            slot = 2
            x = 0.3
            y = 0.9

            [[geometry.card_slots]]
            slot = 3
            x = 0.5
            y = 0.9

            [[geometry.card_slots]]
            slot = 4
            x = 0.7
            y = 0.9

            [geometry.playable_area]
            x_start = 0.0
            y_start = 0.0
            width = 1.0
            height = 0.8
        "#;
        let config = AppConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.game.window_title, "Arena");
        assert_eq!(config.geometry.board_cols, 10);
        assert_eq!(config.geometry.card_slot(3).map(|c| c.x), Some(0.5));
        assert_eq!(config.geometry.playable_area.height, 0.8);
    }

    #[test]
    fn rejects_area_spilling_past_window() {
        let mut geometry = GeometryConfig::default();
        geometry.playable_area.x_start = 0.5;
        geometry.playable_area.width = 0.6;
        let err = geometry.validate().unwrap_err();
        assert!(err.to_string().contains("x_start + width"));
        assert!(matches!(err, VoxPlayError::Config(_)));
    }

    #[test]
    fn rejects_out_of_unit_values() {
        let mut geometry = GeometryConfig::default();
        geometry.card_slots[1].y = 1.2;
        assert!(geometry.validate().is_err());

        let mut geometry = GeometryConfig::default();
        geometry.playable_area.height = f64::NAN;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn rejects_missing_and_duplicate_slots() {
        let mut geometry = GeometryConfig::default();
        geometry.card_slots.pop();
        let err = geometry.validate().unwrap_err();
        assert!(err.to_string().contains("[4]"));

        let mut geometry = GeometryConfig::default();
        geometry.card_slots[3].slot = 2;
        assert!(geometry.validate().unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn example_config_parses() {
        let config = AppConfig::from_toml_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.geometry, GeometryConfig::default());
        assert_eq!(config.voice.stop_phrases.len(), 2);
        assert_eq!(config.voice.microphone, MicrophoneConfig::default());
        assert_eq!(config.llm.providers["gemini"].timeout_secs, 30);
    }

    #[test]
    fn voice_input_is_selectable() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.voice.input, CommandInput::Microphone);
        assert_eq!(config.voice.microphone.pause_threshold_ms, 1000);
        assert_eq!(config.voice.transcription_model, None);

        let doc = r#"
            [voice]
            input = "stdin"
            transcription_model = "gemini-2.0-flash"

            [voice.microphone]
            device = "USB"
            pause_threshold_ms = 800
        "#;
        let config = AppConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.voice.input, CommandInput::Stdin);
        assert_eq!(config.voice.transcription_model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(config.voice.microphone.device.as_deref(), Some("USB"));
        assert_eq!(config.voice.microphone.pause_threshold_ms, 800);
        assert_eq!(config.voice.microphone.ambient_ms, 1000);
        assert_eq!(config.voice.stop_phrases.len(), 2);

        assert!(AppConfig::from_toml_str("[voice]\ninput = \"keyboard\"").is_err());
    }

    #[test]
    fn rejects_empty_board() {
        let geometry = GeometryConfig {
            board_rows: 0,
            ..GeometryConfig::default()
        };
        assert!(geometry.validate().is_err());
    }
}
