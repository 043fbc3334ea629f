use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audrv_core::{AudioDriver, DriverConfig, SampleProducer, Timer};

use crate::pacer::{tick_interval_ms, Pacer};
use crate::{Error, FileRenderer, Result};

/// File sink: writes one block per due timer tick, paced as if the file were
/// a realtime output.
pub struct FileDriver {
    timer: Option<Timer>,
    state: Arc<Mutex<State>>,
}

type TickFn = Box<dyn FnMut(u64) -> ControlFlow<()> + Send>;

struct State {
    pacer: Pacer,
    renderer: Option<FileRenderer>,
}

impl FileDriver {
    pub fn new(config: &DriverConfig, producer: SampleProducer) -> Result<FileDriver> {
        FileDriver::with_timer(config, producer, |interval, tick| {
            Timer::start("audrv-file-timer", interval, tick)
        })
    }

    fn with_timer<S>(
        config: &DriverConfig,
        producer: SampleProducer,
        start_timer: S,
    ) -> Result<FileDriver>
    where
        S: FnOnce(Duration, TickFn) -> audrv_core::Result<Timer>,
    {
        config.validate()?;

        let Some(path) = config.file.path.as_deref() else {
            tracing::error!("no file name specified");
            return Err(Error::NoFileName);
        };

        let renderer = FileRenderer::create(
            path,
            &config.file,
            config.period_size,
            config.sample_rate,
            producer,
        )
        .inspect_err(|e| tracing::error!(error = %e, "failed to create file renderer"))?;

        let state = Arc::new(Mutex::new(State {
            pacer: Pacer::new(config.period_size, config.sample_rate),
            renderer: Some(renderer),
        }));

        let interval = tick_interval_ms(config.period_size, config.sample_rate);
        let timer_state = state.clone();

        let tick: TickFn = Box::new(move |clock_ms| {
            let Ok(mut state) = timer_state.lock() else {
                return ControlFlow::Break(());
            };

            let State { pacer, renderer } = &mut *state;
            match renderer {
                Some(renderer) => pacer.tick(clock_ms, renderer).control_flow(),
                None => ControlFlow::Break(()),
            }
        });

        // On error `state` and the timer's copy of it are dropped, which
        // closes the file.
        let timer = start_timer(Duration::from_millis(interval), tick)
            .inspect_err(|e| tracing::error!(error = %e, "couldn't create the file timer"))?;

        tracing::info!(path = %path.display(), interval_ms = interval, "using file driver");

        Ok(FileDriver {
            timer: Some(timer),
            state,
        })
    }

    /// Frames rendered so far.
    pub fn samples(&self) -> u64 {
        self.state.lock().map_or(0, |state| state.pacer.samples())
    }

    /// Stops the timer, then flushes and closes the file. Returns the number
    /// of frames written.
    pub fn finish(mut self) -> Result<u64> {
        self.stop()
    }

    fn stop(&mut self) -> Result<u64> {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }

        let Ok(mut state) = self.state.lock() else {
            return Ok(0);
        };

        let samples = state.pacer.samples();
        match state.renderer.take() {
            Some(renderer) => renderer.finish().map(|()| samples),
            None => Ok(samples),
        }
    }
}

impl AudioDriver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for FileDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "failed to finish output file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    use audrv_core::Synth;

    use super::*;

    struct Silence {
        dropped: Arc<AtomicBool>,
    }

    impl Synth for Silence {
        fn write_interleaved(&mut self, out: &mut [f32]) {
            out.fill(0.0);
        }
    }

    impl Drop for Silence {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn timer_failure_releases_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");

        let mut config = DriverConfig::default();
        config.file.path = Some(path.clone());

        let dropped = Arc::new(AtomicBool::new(false));
        let producer = SampleProducer::from_synth(Silence {
            dropped: dropped.clone(),
        });

        let result = FileDriver::with_timer(&config, producer, |_, _| {
            Err(audrv_core::Error::ThreadSpawn(io::Error::other("no threads")))
        });

        assert!(matches!(
            result,
            Err(Error::Core(audrv_core::Error::ThreadSpawn(_)))
        ));
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn timer_gets_period_interval() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = DriverConfig {
            period_size: 441,
            ..Default::default()
        };
        config.file.path = Some(dir.path().join("out.raw"));

        let dropped = Arc::new(AtomicBool::new(false));
        let producer = SampleProducer::from_synth(Silence { dropped });

        let driver = FileDriver::with_timer(&config, producer, |interval, tick| {
            assert_eq!(interval, Duration::from_millis(10));
            Timer::start("test-file-timer", interval, tick)
        })
        .unwrap();

        assert_eq!(driver.finish().unwrap() % 441, 0);
    }
}
