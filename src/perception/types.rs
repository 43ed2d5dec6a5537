use serde::{Deserialize, Serialize};

use crate::executor::coordinator::WindowRect;

/// Screenshot of the game window plus the rectangle it was taken from.
#[derive(Debug, Clone)]
pub struct WindowCapture {
    pub title: String,
    pub rect: WindowRect,
    /// PNG encoding of the screenshot, base64.
    pub image_base64: String,
}

impl WindowCapture {
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.image_base64)
    }
}

/// Lightweight listing entry used when the target window cannot be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub app_name: String,
    pub minimized: bool,
}
