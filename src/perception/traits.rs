use crate::errors::VoxPlayResult;
use crate::perception::types::WindowCapture;

/// Finds and captures the game window each cycle.
pub trait WindowSource {
    /// `Ok(None)` when no window matches `title`.
    fn capture(&self, title: &str) -> VoxPlayResult<Option<WindowCapture>>;
}
