//! Per-second tick statistics

use std::time::{Duration, Instant};

use crate::pipeline::TickReport;

/// Totals for one reporting window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub ticks: u64,
    pub hands: u64,
    pub directives: u64,
    pub skipped_hands: u64,
    /// Ticks per second over the window
    pub fps: f64,
}

/// Accumulates tick reports and emits a summary once per window
pub struct TickStats {
    window: Duration,
    window_start: Instant,
    current: WindowStats,
}

impl TickStats {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            current: WindowStats::default(),
        }
    }

    /// Add a tick. Returns the finished window when `now` closes it.
    pub fn record(&mut self, report: &TickReport, now: Instant) -> Option<WindowStats> {
        self.current.ticks += 1;
        self.current.hands += report.hands as u64;
        self.current.directives += report.directives.len() as u64;
        self.current.skipped_hands += report.skipped_hands as u64;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let mut finished = std::mem::take(&mut self.current);
        finished.fps = finished.ticks as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        Some(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(hands: usize, directives: usize) -> TickReport {
        TickReport {
            frame_number: 0,
            hands,
            directives: vec![
                crate::overlay::PlacementDirective {
                    sprite: crate::overlay::SpriteId::Peace,
                    anchor_x: 0.0,
                    anchor_y: 0.0,
                    scale: 1.0,
                };
                directives
            ],
            skipped_hands: hands - directives,
        }
    }

    #[test]
    fn test_window_summary() {
        let start = Instant::now();
        let mut stats = TickStats::starting_at(Duration::from_secs(1), start);

        assert_eq!(stats.record(&report(1, 1), start + Duration::from_millis(300)), None);
        assert_eq!(stats.record(&report(2, 1), start + Duration::from_millis(600)), None);
        let window = stats
            .record(&report(0, 0), start + Duration::from_millis(1500))
            .unwrap();

        assert_eq!((window.ticks, window.hands, window.directives), (3, 3, 2));
        assert_eq!(window.skipped_hands, 1);
        assert!((window.fps - 2.0).abs() < 1e-9);

        // next window starts empty
        let next = stats
            .record(&report(1, 0), start + Duration::from_millis(2600))
            .unwrap();
        assert_eq!(next.ticks, 1);
    }
}
