/// Countdown and flash around each shot
///
/// A round always runs to completion once started: there is no
/// cancellation path between the first tick and the returned frame.

use std::time::Duration;
use tokio::time::sleep;

use super::{capture_frame, CapturedFrame, VideoFeed};
use crate::config::Timing;
use crate::error::CaptureError;

const TICK: Duration = Duration::from_secs(1);

/// Count down from `seconds`, reporting each visible value once per second
///
/// `on_tick` sees `seconds, seconds - 1, ..., 1`; the future resolves one
/// second after the last value.
pub async fn run_countdown<F>(seconds: u32, mut on_tick: F)
where
    F: FnMut(u32),
{
    for remaining in (1..=seconds).rev() {
        on_tick(remaining);
        sleep(TICK).await;
    }
}

/// Drives countdown, flash and capture for one shot
#[derive(Debug, Clone, Copy)]
pub struct Sequencer {
    countdown_secs: u32,
    flash: Duration,
    quality: u8,
}

impl Sequencer {
    pub fn new(timing: &Timing, quality: u8) -> Self {
        Self {
            countdown_secs: timing.countdown_secs,
            flash: timing.flash,
            quality,
        }
    }

    pub async fn countdown<F>(&self, on_tick: F)
    where
        F: FnMut(u32),
    {
        run_countdown(self.countdown_secs, on_tick).await
    }

    /// Raise the flash, grab the frame, hold the flash, lower it
    pub async fn flash_capture<F>(
        &self,
        feed: &dyn VideoFeed,
        mut on_flash: F,
    ) -> Result<CapturedFrame, CaptureError>
    where
        F: FnMut(bool),
    {
        on_flash(true);
        let shot = capture_frame(feed, self.quality);
        sleep(self.flash).await;
        on_flash(false);
        shot
    }
}
