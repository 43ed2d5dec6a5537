use crate::executor::action::RawAction;
use crate::executor::coordinator::WindowRect;
use crate::perception::types::WindowCapture;

/// One state per pipeline stage. Every cycle starts at `Listening` and
/// returns there through `Pausing`.
#[derive(Debug, Clone)]
pub enum CycleState {
    Listening,
    Capturing { command: String },
    Consulting { command: String, capture: WindowCapture },
    Acting { raw: RawAction, window: WindowRect },
    Pausing,
    Exit,
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            CycleState::Listening => "listening",
            CycleState::Capturing { .. } => "capturing",
            CycleState::Consulting { .. } => "consulting",
            CycleState::Acting { .. } => "acting",
            CycleState::Pausing => "pausing",
            CycleState::Exit => "exit",
        }
    }
}

/// Running tally of how cycles ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u32,
    pub plays: u32,
    pub no_ops: u32,
    pub failures: u32,
}
