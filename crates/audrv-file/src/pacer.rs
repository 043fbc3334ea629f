use std::ops::ControlFlow;

use crate::Result;

/// Something that renders and stores exactly one block per call.
pub trait BlockRenderer {
    fn process_block(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// The next block is not due yet.
    Idle,
    Rendered,
    /// The renderer failed; the timer must stop.
    Failed,
}

impl TickOutcome {
    pub fn control_flow(self) -> ControlFlow<()> {
        match self {
            TickOutcome::Idle | TickOutcome::Rendered => ControlFlow::Continue(()),
            TickOutcome::Failed => ControlFlow::Break(()),
        }
    }
}

/// Emulates realtime output from a sample counter: a block is due once the
/// audio rendered so far does not reach past the elapsed clock time.
#[derive(Debug, Clone)]
pub struct Pacer {
    period_size: usize,
    sample_rate: f64,
    samples: u64,
}

impl Pacer {
    pub fn new(period_size: usize, sample_rate: f64) -> Pacer {
        Pacer {
            period_size,
            sample_rate,
            samples: 0,
        }
    }

    /// Frames rendered so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Milliseconds of audio covered by the rendered frames, truncated.
    pub fn sample_time_ms(&self) -> u64 {
        (self.samples as f64 / self.sample_rate * 1000.0) as u64
    }

    /// Renders at most one block. Never catches up: a pacer that fell behind
    /// the clock renders one block per call until it is back in time.
    pub fn tick<R>(&mut self, clock_ms: u64, renderer: &mut R) -> TickOutcome
    where
        R: BlockRenderer + ?Sized,
    {
        if self.sample_time_ms() > clock_ms {
            return TickOutcome::Idle;
        }

        self.samples += self.period_size as u64;

        match renderer.process_block() {
            Ok(()) => TickOutcome::Rendered,
            Err(e) => {
                tracing::error!(error = %e, samples = self.samples, "failed to render block");
                TickOutcome::Failed
            }
        }
    }
}

/// Timer interval for one period, rounded half up to whole milliseconds.
pub fn tick_interval_ms(period_size: usize, sample_rate: f64) -> u64 {
    (0.5 + period_size as f64 / sample_rate * 1000.0) as u64
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Counting {
        blocks: u32,
        fail_at: Option<u32>,
    }

    impl BlockRenderer for Counting {
        fn process_block(&mut self) -> Result<()> {
            self.blocks += 1;
            if self.fail_at == Some(self.blocks) {
                return Err(Error::NoFileName);
            }
            Ok(())
        }
    }

    #[test]
    fn interval_rounding() {
        assert_eq!(tick_interval_ms(64, 44100.0), 1);
        assert_eq!(tick_interval_ms(441, 44100.0), 10);
        assert_eq!(tick_interval_ms(1024, 48000.0), 21);
        // Exactly half a millisecond rounds up.
        assert_eq!(tick_interval_ms(1, 2000.0), 1);
        assert_eq!(tick_interval_ms(1, 2001.0), 0);
        assert_eq!(tick_interval_ms(3, 2000.0), 2);
    }

    #[test]
    fn first_tick_renders() {
        let mut pacer = Pacer::new(64, 44100.0);
        let mut renderer = Counting::default();

        assert_eq!(pacer.tick(0, &mut renderer), TickOutcome::Rendered);
        assert_eq!(pacer.samples(), 64);

        // 64 frames cover 1 ms, which is ahead of a 0 ms clock.
        assert_eq!(pacer.tick(0, &mut renderer), TickOutcome::Idle);
        assert_eq!(pacer.samples(), 64);
        assert_eq!(renderer.blocks, 1);

        assert_eq!(pacer.tick(1, &mut renderer), TickOutcome::Rendered);
        assert_eq!(pacer.samples(), 128);
    }

    #[test]
    fn no_catch_up() {
        let mut pacer = Pacer::new(64, 44100.0);
        let mut renderer = Counting::default();

        for i in 1..=100 {
            assert_eq!(pacer.tick(1_000_000, &mut renderer), TickOutcome::Rendered);
            assert_eq!(pacer.samples(), 64 * i);
        }
    }

    #[test]
    fn failure_stops() {
        let mut pacer = Pacer::new(32, 8000.0);
        let mut renderer = Counting {
            fail_at: Some(3),
            ..Default::default()
        };

        assert_eq!(pacer.tick(100, &mut renderer), TickOutcome::Rendered);
        assert_eq!(pacer.tick(100, &mut renderer), TickOutcome::Rendered);

        let outcome = pacer.tick(100, &mut renderer);
        assert_eq!(outcome, TickOutcome::Failed);
        assert!(outcome.control_flow().is_break());
        assert_eq!(pacer.samples(), 96);
    }

    #[test]
    fn counter_advances_by_whole_periods() {
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..200 {
            let period_size = rng.gen_range(1..4096);
            let sample_rate = rng.gen_range(1000.0..192000.0);
            let mut pacer = Pacer::new(period_size, sample_rate);
            let mut renderer = Counting::default();
            let mut clock = 0;

            for _ in 0..500 {
                clock += rng.gen_range(0..5);

                let before = pacer.samples();
                let outcome = pacer.tick(clock, &mut renderer);
                let delta = pacer.samples() - before;

                match outcome {
                    TickOutcome::Idle => assert_eq!(delta, 0),
                    TickOutcome::Rendered => assert_eq!(delta, period_size as u64),
                    TickOutcome::Failed => unreachable!(),
                }
            }

            // The counter never runs ahead of the clock by more than a period.
            let ahead = pacer.samples() as f64 / sample_rate * 1000.0 - clock as f64;
            assert!(ahead <= period_size as f64 / sample_rate * 1000.0 + 1.0);
        }
    }
}
