//! Progress reporting during sample block transfers.

/// Receives coarse percentage updates while sample blocks stream.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

/// Default sink that swallows all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// Rate-limits updates to 5% steps so tight row loops do not flood the
/// sink.
pub struct ProgressTicker<'a> {
    sink: &'a mut dyn ProgressSink,
    total: u64,
    done: u64,
    last_percent: u8,
}

impl<'a> ProgressTicker<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, total: u64) -> Self {
        Self { sink, total, done: 0, last_percent: 0 }
    }

    pub fn advance(&mut self, units: u64) {
        self.done = (self.done + units).min(self.total);
        if self.total == 0 {
            return;
        }
        let percent = (self.done * 100 / self.total) as u8;
        if percent >= self.last_percent + 5 || (percent == 100 && self.last_percent < 100) {
            self.last_percent = percent;
            self.sink.report(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture(Vec<u8>);

    impl ProgressSink for Capture {
        fn report(&mut self, percent: u8) {
            self.0.push(percent);
        }
    }

    #[test]
    fn updates_arrive_in_coarse_steps() {
        let mut capture = Capture::default();
        {
            let mut ticker = ProgressTicker::new(&mut capture, 1000);
            for _ in 0..1000 {
                ticker.advance(1);
            }
        }
        assert_eq!(capture.0.first(), Some(&5));
        assert_eq!(capture.0.last(), Some(&100));
        assert!(capture.0.len() <= 21);
        assert!(capture.0.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_total_emits_nothing() {
        let mut capture = Capture::default();
        {
            let mut ticker = ProgressTicker::new(&mut capture, 0);
            ticker.advance(10);
        }
        assert!(capture.0.is_empty());
    }
}
