//! Per-point elapsed-time helper.

use std::time::Instant;

/// Timer started at the top of a point solve; consumed into milliseconds.
pub struct PointTimer {
    start: Instant,
}

impl PointTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed wall time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
