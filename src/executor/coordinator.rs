// Relative geometry → absolute screen pixels.
//
// All rounding is `floor`, applied once per output coordinate after the
// half-tile offset, never on intermediate tile sizes.
use serde::{Deserialize, Serialize};

use crate::config::GeometryConfig;
use crate::executor::action::ValidatedAction;

/// Absolute screen rectangle of the game window, captured fresh each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

/// The two clicks of a card play. Only meaningful for the `WindowRect` it
/// was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickPlan {
    pub card_point: ScreenPoint,
    pub grid_point: ScreenPoint,
}

/// Playable area resolved to absolute pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelArea {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

fn scaled(extent: u32, fraction: f64) -> i32 {
    (f64::from(extent) * fraction).floor() as i32
}

pub fn resolve_playable_area(window: &WindowRect, geometry: &GeometryConfig) -> PixelArea {
    let area = &geometry.playable_area;
    PixelArea {
        left: window.left + scaled(window.width, area.x_start),
        top: window.top + scaled(window.height, area.y_start),
        width: scaled(window.width, area.width).max(0) as u32,
        height: scaled(window.height, area.height).max(0) as u32,
    }
}

/// Maps a validated play onto the live window. Pure and deterministic.
pub fn map_to_screen(
    action: &ValidatedAction,
    window: &WindowRect,
    geometry: &GeometryConfig,
) -> ClickPlan {
    // ValidatedAction guarantees the slot is configured unless the geometry
    // was swapped out after validation.
    let (rx, ry) = match geometry.card_slot(action.card_slot()) {
        Some(card) => (card.x, card.y),
        None => {
            tracing::warn!(
                slot = action.card_slot(),
                "card slot missing from geometry, card click falls on the window origin"
            );
            (0.0, 0.0)
        }
    };
    let card_point = ScreenPoint {
        x: window.left + scaled(window.width, rx),
        y: window.top + scaled(window.height, ry),
    };

    let area = resolve_playable_area(window, geometry);
    let tile_w = f64::from(area.width) / f64::from(geometry.board_cols);
    let tile_h = f64::from(area.height) / f64::from(geometry.board_rows);
    let grid_point = ScreenPoint {
        x: area.left + ((f64::from(action.grid_x()) + 0.5) * tile_w).floor() as i32,
        y: area.top + ((f64::from(action.grid_y()) + 0.5) * tile_h).floor() as i32,
    };

    ClickPlan {
        card_point,
        grid_point,
    }
}
