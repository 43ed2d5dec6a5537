use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::state::{CycleState, SessionStats};
use crate::config::AppConfig;
use crate::errors::VoxPlayError;
use crate::executor::action::{parse_action_response, validate, ActionOutcome, NoOp};
use crate::executor::coordinator::map_to_screen;
use crate::executor::input::{InputPlayer, PointerDriver};
use crate::llm::prompt::{build_action_prompt, SYSTEM_PROMPT};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::traits::WindowSource;
use crate::perception::types::WindowCapture;
use crate::voice::command::is_stop_command;
use crate::voice::listener::CommandListener;

/// Drives listen → capture → consult → act, one command at a time.
///
/// Nothing here runs concurrently: each stage is awaited before the next
/// begins, and only the configuration outlives a cycle.
pub struct Session<D: PointerDriver> {
    state: CycleState,
    config: AppConfig,
    listener: Box<dyn CommandListener>,
    windows: Box<dyn WindowSource>,
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    player: InputPlayer<D>,
    stats: SessionStats,
}

impl<D: PointerDriver> Session<D> {
    pub fn new(
        config: AppConfig,
        listener: Box<dyn CommandListener>,
        windows: Box<dyn WindowSource>,
        provider: Arc<dyn LlmProvider>,
        call: CallConfig,
        driver: D,
    ) -> Self {
        let player = InputPlayer::new(driver, &config.playback);
        Self {
            state: CycleState::Listening,
            config,
            listener,
            windows,
            provider,
            call,
            player,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn driver(&self) -> &D {
        self.player.driver()
    }

    /// Runs until a stop phrase is heard or command input closes.
    pub async fn run_loop(&mut self) -> SessionStats {
        loop {
            let state = std::mem::replace(&mut self.state, CycleState::Pausing);
            tracing::trace!(state = state.name(), "enter state");

            self.state = match state {
                CycleState::Listening => self.on_listening().await,
                CycleState::Capturing { command } => self.on_capturing(command),
                CycleState::Consulting { command, capture } => {
                    self.on_consulting(&command, &capture).await
                }
                CycleState::Acting { raw, window } => {
                    match validate(&raw, &self.config.geometry) {
                        ActionOutcome::Valid(action) => {
                            let plan = map_to_screen(&action, &window, &self.config.geometry);
                            tracing::info!(
                                reasoning = raw.reasoning.as_deref().unwrap_or("n/a"),
                                card_slot = action.card_slot(),
                                card_x = plan.card_point.x,
                                card_y = plan.card_point.y,
                                grid_x = action.grid_x(),
                                grid_y = action.grid_y(),
                                target_x = plan.grid_point.x,
                                target_y = plan.grid_point.y,
                                "executing action"
                            );
                            match self.player.execute(&plan).await {
                                Ok(()) => {
                                    self.stats.plays += 1;
                                    tracing::info!("action executed");
                                }
                                Err(e) => {
                                    self.stats.failures += 1;
                                    tracing::warn!(error = %e, "pointer playback aborted");
                                }
                            }
                        }
                        ActionOutcome::NoOp(reason) => self.record_no_op(&reason),
                    }
                    CycleState::Pausing
                }
                CycleState::Pausing => {
                    self.stats.cycles += 1;
                    tokio::time::sleep(Duration::from_millis(self.config.playback.cycle_pause_ms))
                        .await;
                    CycleState::Listening
                }
                CycleState::Exit => break,
            };
        }

        tracing::info!(
            cycles = self.stats.cycles,
            plays = self.stats.plays,
            no_ops = self.stats.no_ops,
            failures = self.stats.failures,
            "session ended"
        );
        self.stats
    }

    async fn on_listening(&mut self) -> CycleState {
        match self.listener.listen().await {
            Ok(Some(command)) => {
                if is_stop_command(&command, &self.config.voice.stop_phrases) {
                    tracing::info!(command = %command, "stop phrase heard, exiting");
                    CycleState::Exit
                } else {
                    CycleState::Capturing { command }
                }
            }
            Ok(None) => {
                self.stats.no_ops += 1;
                CycleState::Pausing
            }
            Err(VoxPlayError::InputClosed) => {
                tracing::info!("command input closed, exiting");
                CycleState::Exit
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, "listening failed");
                CycleState::Pausing
            }
        }
    }

    fn on_capturing(&mut self, command: String) -> CycleState {
        match self.windows.capture(&self.config.game.window_title) {
            Ok(Some(capture)) => CycleState::Consulting { command, capture },
            Ok(None) => {
                self.stats.failures += 1;
                tracing::warn!(
                    title = %self.config.game.window_title,
                    "game window not found, make sure it is visible"
                );
                CycleState::Pausing
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, "window capture failed");
                CycleState::Pausing
            }
        }
    }

    async fn on_consulting(
        &mut self,
        command: &str,
        capture: &WindowCapture,
    ) -> CycleState {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_image(
                build_action_prompt(command, &self.config.geometry),
                capture.data_url(),
            ),
        ];

        tracing::info!(provider = self.provider.name(), model = %self.call.model, "asking model");
        let response = match self.provider.chat(messages, &self.call).await {
            Ok(r) => r,
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, "model call failed");
                return CycleState::Pausing;
            }
        };
        tracing::debug!(content = %response.content, "model raw response");

        match parse_action_response(&response.content) {
            Ok(raw) => CycleState::Acting {
                raw,
                window: capture.rect,
            },
            Err(reason) => {
                self.record_no_op(&reason);
                CycleState::Pausing
            }
        }
    }

    fn record_no_op(&mut self, reason: &NoOp) {
        self.stats.no_ops += 1;
        tracing::info!(reason = %reason, "no action this cycle");
    }
}
