pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod voice;

use std::process::ExitCode;

use crate::agent_engine::engine::Session;
use crate::config::CommandInput;
use crate::executor::input::EnigoPointer;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::CallConfig;
use crate::perception::screenshot::XcapWindowSource;
use crate::voice::listener::{CommandListener, ConsoleListener, SpeechListener};
use crate::voice::microphone::CpalMicrophone;
use crate::voice::transcribe::ModelTranscriber;

/// Process entry: set up logging, load config and credentials, then run the
/// command loop until a stop phrase.
///
/// Startup failures return a non-zero exit code; nothing that goes wrong
/// inside a cycle ends the process.
pub async fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let registry = match ProviderRegistry::from_config(&config.llm) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "model credentials unavailable");
            return ExitCode::FAILURE;
        }
    };
    let (provider, call) = match registry.active_call() {
        Ok(active) => active,
        Err(e) => {
            tracing::error!(error = %e, "no usable model provider");
            return ExitCode::FAILURE;
        }
    };

    let pointer = match EnigoPointer::new() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "cannot control the pointer");
            return ExitCode::FAILURE;
        }
    };

    let listener: Box<dyn CommandListener> = match config.voice.input {
        CommandInput::Stdin => {
            tracing::info!("reading one transcribed command per line from stdin");
            Box::new(ConsoleListener::stdin())
        }
        CommandInput::Microphone => {
            let microphone = match CpalMicrophone::new(config.voice.microphone.clone()) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(error = %e, "cannot open the microphone; set [voice] input = \"stdin\" to type commands");
                    return ExitCode::FAILURE;
                }
            };
            let transcription = CallConfig {
                model: config
                    .voice
                    .transcription_model
                    .clone()
                    .unwrap_or_else(|| call.model.clone()),
                temperature: 0.0,
            };
            Box::new(SpeechListener::new(
                Box::new(microphone),
                Box::new(ModelTranscriber::new(provider.clone(), transcription)),
            ))
        }
    };

    tracing::info!(
        window = %config.game.window_title,
        stop_phrases = ?config.voice.stop_phrases,
        "voice control ready, make sure the game window is visible"
    );

    let mut session = Session::new(
        config,
        listener,
        Box::new(XcapWindowSource),
        provider,
        call,
        pointer,
    );
    session.run_loop().await;
    ExitCode::SUCCESS
}
