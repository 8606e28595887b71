use std::collections::VecDeque;

/// Fixed-capacity FIFO of recent magnitudes with an on-demand RMS.
#[derive(Debug, Clone)]
pub struct RmsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

/// Result of a single push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReading {
    pub rms: f64,
    /// False until the window has been filled once.
    pub ready: bool,
}

impl RmsWindow {
    /// A zero capacity is bumped to one so the window can always become ready.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, magnitude: f64) -> WindowReading {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(magnitude);

        WindowReading {
            rms: self.rms(),
            ready: self.is_ready(),
        }
    }

    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_of_squares: f64 = self.samples.iter().map(|value| value * value).sum();
        (sum_of_squares / self.samples.len() as f64).sqrt()
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change capacity, keeping the most recent entries that still fit.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
        self.capacity = capacity;
    }
}
