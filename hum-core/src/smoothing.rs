//! Averaging window that damps frame-to-frame jitter in the tracked
//! frequency before it is classified.

use log::warn;

/// Collects raw frequencies until a decision window is full.
#[derive(Debug, Clone)]
pub struct FrequencyBuffer {
    samples: Vec<f32>,
    capacity: usize,
}

impl FrequencyBuffer {
    /// Creates a buffer that becomes ready after `capacity` pushes.
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frequency: f32) {
        self.samples.push(frequency);
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Returns the mean of the buffered frequencies and empties the buffer.
    ///
    /// Consuming an empty buffer yields 0.0. Callers gate on [`is_ready`],
    /// so reaching that case indicates a bug upstream.
    ///
    /// [`is_ready`]: FrequencyBuffer::is_ready
    pub fn consume(&mut self) -> f32 {
        if self.samples.is_empty() {
            warn!("[ENGINE] Frequency buffer consumed while empty");
            return 0.0;
        }
        let mean = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        self.samples.clear();
        mean
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
}
