use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Counts rendered frames and reports frames-per-second once per window.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    window_start: Option<Instant>,
    frames: u32,
    last: u32,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame rendered at `now`. Returns the new rate when a window
    /// closes.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < WINDOW {
            return None;
        }

        let fps = (f64::from(self.frames) / elapsed.as_secs_f64()).round() as u32;
        self.last = fps;
        self.frames = 0;
        self.window_start = Some(now);
        Some(fps)
    }

    pub fn last(&self) -> u32 {
        self.last
    }
}
