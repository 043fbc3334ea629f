use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use oneshot::RecvTimeoutError;

use crate::{Error, Result};

/// Repeating timer running its callback on a dedicated thread.
///
/// The callback is invoked once right away and then every `interval`, and
/// receives the milliseconds elapsed since the timer started. Returning
/// [`ControlFlow::Break`] ends the chain. The schedule is absolute: the n-th
/// invocation is due `n * interval` after start, so a slow callback delays
/// following invocations without making the timer drift.
pub struct Timer {
    cancel: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    finished: Arc<AtomicBool>,
}

impl Timer {
    pub fn start<F>(name: &str, interval: Duration, mut callback: F) -> Result<Timer>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let (cancel, cancelled) = oneshot::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let thread_finished = finished.clone();

        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let start = Instant::now();
                let mut count: u64 = 0;

                loop {
                    let elapsed = start.elapsed().as_millis() as u64;
                    if callback(elapsed).is_break() {
                        tracing::debug!(elapsed, "timer callback finished");
                        thread_finished.store(true, Ordering::Release);
                        return;
                    }

                    count += 1;

                    let delay = start
                        .checked_add(schedule_offset(interval, count))
                        .map_or(interval, |deadline| {
                            deadline.saturating_duration_since(Instant::now())
                        });

                    match cancelled.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
            .map_err(Error::ThreadSpawn)?;

        Ok(Timer {
            cancel: Some(cancel),
            thread: Some(thread),
            finished,
        })
    }

    /// Whether the callback ended the chain by itself.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stops the timer and waits for an in-flight callback to return. After
    /// this returns the callback is never invoked again.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }
}

/// Offset of the `count`-th invocation from the start of the schedule.
fn schedule_offset(interval: Duration, count: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(count));
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % 1_000_000_000) as u32)
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}
