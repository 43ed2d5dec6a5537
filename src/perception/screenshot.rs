// Game window discovery and capture.
use base64::Engine as _;
use xcap::Window;

use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::executor::coordinator::WindowRect;
use crate::perception::traits::WindowSource;
use crate::perception::types::{WindowCapture, WindowInfo};

/// Desktop windows via `xcap`.
pub struct XcapWindowSource;

impl WindowSource for XcapWindowSource {
    fn capture(&self, title: &str) -> VoxPlayResult<Option<WindowCapture>> {
        capture_window(title)
    }
}

/// Case-insensitive substring match on a window title.
pub fn title_matches(title: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    !pattern.is_empty() && title.to_lowercase().contains(&pattern)
}

fn perception_err(context: &str, e: impl std::fmt::Display) -> VoxPlayError {
    VoxPlayError::Perception(format!("{context}: {e}"))
}

fn window_rect(window: &Window) -> VoxPlayResult<WindowRect> {
    Ok(WindowRect {
        left: window.x().map_err(|e| perception_err("window x", e))?,
        top: window.y().map_err(|e| perception_err("window y", e))?,
        width: window.width().map_err(|e| perception_err("window width", e))?,
        height: window.height().map_err(|e| perception_err("window height", e))?,
    })
}

/// First visible window whose title contains `pattern`.
fn find_target(pattern: &str) -> VoxPlayResult<Option<(Window, String)>> {
    let windows = Window::all().map_err(|e| perception_err("enumerate windows", e))?;
    Ok(windows.into_iter().find_map(|w| {
        let title = w.title().ok()?;
        let minimized = w.is_minimized().unwrap_or(false);
        (!minimized && title_matches(&title, pattern)).then_some((w, title))
    }))
}

/// Captures the target window. The returned rectangle is the one the
/// screenshot was taken from and should be used for this cycle only.
pub fn capture_window(pattern: &str) -> VoxPlayResult<Option<WindowCapture>> {
    let Some((window, title)) = find_target(pattern)? else {
        tracing::debug!(
            pattern = %pattern,
            visible = ?list_windows().unwrap_or_default().iter().map(|w| w.title.as_str()).collect::<Vec<_>>(),
            "no window title matched"
        );
        return Ok(None);
    };

    let rect = window_rect(&window)?;
    let buffer = window
        .capture_image()
        .map_err(|e| perception_err(&format!("capture '{title}'"), e))?;

    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut std::io::Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .map_err(|e| perception_err("PNG encode", e))?;
    let image_base64 = base64::engine::general_purpose::STANDARD.encode(&png_bytes);

    tracing::debug!(
        title = %title,
        left = rect.left,
        top = rect.top,
        width = rect.width,
        height = rect.height,
        base64_len = image_base64.len(),
        "window captured"
    );

    Ok(Some(WindowCapture {
        title,
        rect,
        image_base64,
    }))
}

/// Titled windows currently on screen, for diagnostics.
pub fn list_windows() -> VoxPlayResult<Vec<WindowInfo>> {
    let windows = Window::all().map_err(|e| perception_err("enumerate windows", e))?;
    Ok(windows
        .into_iter()
        .filter_map(|w| {
            let title = w.title().ok()?;
            if title.trim().is_empty() {
                return None;
            }
            Some(WindowInfo {
                title,
                app_name: w.app_name().unwrap_or_default(),
                minimized: w.is_minimized().unwrap_or(false),
            })
        })
        .collect())
}
