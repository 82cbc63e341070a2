use std::time::Instant;

/// Monotonic clock measuring seconds since the current session began.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let clock = SessionClock::start();
        let a = clock.elapsed();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.elapsed();
        assert!(b > a);
        assert!(a >= 0.0);
    }
}
