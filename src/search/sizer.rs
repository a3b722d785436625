//! Archive resolution policies.

/// Yields the number of buckets per dimension for a given run progress.
pub trait MapSizer {
    /// Buckets per dimension at `progress` (fraction of the run done, 0..=1).
    fn size(&self, progress: f64) -> usize;
}

/// Linear interpolation between a start and an end size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearMapSizer {
    start: usize,
    end: usize,
}

impl LinearMapSizer {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl MapSizer for LinearMapSizer {
    fn size(&self, progress: f64) -> usize {
        let t = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let start = self.start as f64;
        let end = self.end as f64;
        // Small epsilon so exact fractions don't round down
        let size = (start + t * (end - start) + 1e-9).floor() as usize;
        size.max(1)
    }
}
