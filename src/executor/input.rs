// Physical input simulation.
use std::time::Duration;

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

use crate::config::PlaybackConfig;
use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::executor::coordinator::{ClickPlan, ScreenPoint};

/// Interval between intermediate pointer positions during a glide.
const GLIDE_STEP: Duration = Duration::from_millis(10);

/// Minimal OS pointer surface the player needs.
pub trait PointerDriver {
    fn location(&mut self) -> VoxPlayResult<ScreenPoint>;
    fn move_to(&mut self, point: ScreenPoint) -> VoxPlayResult<()>;
    fn click(&mut self) -> VoxPlayResult<()>;
}

pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    pub fn new() -> VoxPlayResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| VoxPlayError::Executor(format!("pointer init failed: {e}")))?;
        Ok(Self { enigo })
    }
}

impl PointerDriver for EnigoPointer {
    fn location(&mut self) -> VoxPlayResult<ScreenPoint> {
        let (x, y) = self
            .enigo
            .location()
            .map_err(|e| VoxPlayError::Executor(format!("pointer location: {e}")))?;
        Ok(ScreenPoint { x, y })
    }

    fn move_to(&mut self, point: ScreenPoint) -> VoxPlayResult<()> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|e| VoxPlayError::Executor(format!("move to ({}, {}): {e}", point.x, point.y)))
    }

    fn click(&mut self) -> VoxPlayResult<()> {
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| VoxPlayError::Executor(format!("left click: {e}")))
    }
}

/// Replays a [`ClickPlan`]: glide to the card, click, pause, glide to the
/// board cell, click. Steps are strictly sequential and the first failing
/// step aborts the rest.
pub struct InputPlayer<D: PointerDriver> {
    driver: D,
    move_duration: Duration,
    click_gap: Duration,
}

impl<D: PointerDriver> InputPlayer<D> {
    pub fn new(driver: D, playback: &PlaybackConfig) -> Self {
        Self {
            driver,
            move_duration: Duration::from_millis(playback.move_duration_ms),
            click_gap: Duration::from_millis(playback.click_gap_ms),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub async fn execute(&mut self, plan: &ClickPlan) -> VoxPlayResult<()> {
        self.glide_to(plan.card_point).await?;
        self.driver.click()?;
        tracing::debug!(x = plan.card_point.x, y = plan.card_point.y, "card clicked");

        // Give the game time to register the card selection.
        tokio::time::sleep(self.click_gap).await;

        self.glide_to(plan.grid_point).await?;
        self.driver.click()?;
        tracing::debug!(x = plan.grid_point.x, y = plan.grid_point.y, "board clicked");
        Ok(())
    }

    async fn glide_to(&mut self, target: ScreenPoint) -> VoxPlayResult<()> {
        let steps = (self.move_duration.as_millis() / GLIDE_STEP.as_millis()).max(1) as u32;
        if steps == 1 {
            return self.driver.move_to(target);
        }

        let start = match self.driver.location() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "pointer location unavailable, jumping to target");
                return self.driver.move_to(target);
            }
        };

        for i in 1..=steps {
            let t = ease_in_out(f64::from(i) / f64::from(steps));
            self.driver.move_to(interpolate(start, target, t))?;
            if i < steps {
                tokio::time::sleep(GLIDE_STEP).await;
            }
        }
        Ok(())
    }
}

/// Quadratic ease-in-out on `t` in [0, 1].
fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

fn interpolate(from: ScreenPoint, to: ScreenPoint, t: f64) -> ScreenPoint {
    let lerp = |a: i32, b: i32| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as i32;
    ScreenPoint {
        x: lerp(from.x, to.x),
        y: lerp(from.y, to.y),
    }
}
