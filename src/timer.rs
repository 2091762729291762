//! Frame timing

use std::time::Instant;

/// Seconds since the previous tick, total elapsed seconds and ticks so far.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_frame_time: Instant,
    delta_seconds: f32,
    total_seconds: f64,
    frame_count: u64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last_frame_time: Instant::now(),
            delta_seconds: 0.0,
            total_seconds: 0.0,
            frame_count: 0,
        }
    }

    /// Advance using the wall clock.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.tick_with(dt);
    }

    /// Advance by a fixed step.
    pub fn tick_with(&mut self, dt: f32) {
        self.delta_seconds = dt.max(0.0);
        self.total_seconds += self.delta_seconds as f64;
        self.frame_count += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta_seconds
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
