/// Sliding-window arithmetic mean, used to smooth clock-sync delta/latency
/// samples.
use std::collections::VecDeque;

/// Window size used by the clock-sync delta and latency estimators.
pub const WINDOW: usize = 40;

#[derive(Debug, Clone)]
pub struct RunningMean {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RunningMean {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Push a new sample, evicting the oldest once `capacity` is exceeded.
    pub fn feed(&mut self, value: f64) {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
    }

    /// Arithmetic mean of the current window. `0.0` when nothing has been
    /// fed yet.
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for RunningMean {
    fn default() -> Self {
        Self::new(WINDOW)
    }
}
