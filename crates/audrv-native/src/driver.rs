use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use audrv_core::{
    AudioBlock, AudioDriver, DriverConfig, Error as CoreError, SampleProducer, NUM_CHANNELS,
};

use crate::backend::{BufferQueue, DataSource, NativeBackend, PcmFormat, PcmSampleFormat};
use crate::{EngineOptions, Error, HandleChain, PlayerDesc, Result, Step, QUEUE_DEPTH};

/// Realtime sink: pushes blocks into a native buffer queue from a dedicated
/// production thread.
pub struct RealtimeDriver<B: NativeBackend> {
    backend: B,
    chain: HandleChain<B>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<LoopExit>>,
}

/// Why the production loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// The running flag was cleared.
    Stopped,
    /// The buffer queue rejected a block.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopExit {
    pub blocks_enqueued: u64,
    pub reason: ExitReason,
}

impl<B: NativeBackend> RealtimeDriver<B> {
    pub fn new(
        backend: B,
        config: &DriverConfig,
        producer: SampleProducer,
    ) -> Result<RealtimeDriver<B>> {
        config.validate()?;

        let mut driver = RealtimeDriver {
            backend,
            chain: HandleChain::new(),
            running: Arc::new(AtomicBool::new(true)),
            thread: None,
        };

        // On error `driver` is dropped, which releases the partial chain.
        driver.start(config, producer)?;

        tracing::info!("using {} realtime driver", driver.backend.name());

        Ok(driver)
    }

    fn start(&mut self, config: &DriverConfig, producer: SampleProducer) -> Result<()> {
        let sample_rate = config.sample_rate_hz();
        let period_frames = u32::try_from(config.period_size)
            .map_err(|_| CoreError::InvalidConfig("period size does not fit in 32 bits"))?;

        let block = AudioBlock::new(config.period_size);

        tracing::debug!(
            period_size = config.period_size,
            sample_rate,
            block_bytes = block.byte_len(),
            "starting realtime driver"
        );

        let options = EngineOptions {
            app_name: "audrv".into(),
            server: config.native.server().map(Into::into),
        };

        let desc = PlayerDesc {
            source: DataSource {
                queue_depth: QUEUE_DEPTH,
                frames_per_buffer: config.period_size,
                format: PcmFormat {
                    channels: NUM_CHANNELS as u32,
                    sample_rate,
                    sample_format: PcmSampleFormat::F32Le,
                },
            },
            media_role: config.native.media_role.clone(),
            latency: config
                .native
                .adjust_latency
                .then_some(period_frames),
        };

        self.chain
            .acquire(&self.backend, &options, config.native.device(), &desc)?;

        let Some(queue) = self.chain.take_buffer_queue() else {
            return Err(Error::native(Step::BufferQueueInterface, MissingQueue));
        };

        let running = self.running.clone();
        let realtime_prio = config.realtime_prio;

        let thread = self
            .backend
            .spawn_thread("audrv-realtime", move || {
                let _priority = (realtime_prio > 0)
                    .then(|| promote_to_realtime(period_frames, sample_rate))
                    .flatten();

                run(&running, producer, queue, block)
            })
            .map_err(|e| {
                tracing::error!(error = %e, "failed to spawn production thread");
                Error::ThreadSpawn(e)
            })?;

        self.thread = Some(thread);

        Ok(())
    }

    /// Stops the production loop and releases the native objects.
    ///
    /// Blocks until the loop notices the cleared flag, which takes at most one
    /// block production and one enqueue. Returns the loop's exit summary the
    /// first time it is called after a successful start.
    pub fn shutdown(&mut self) -> Option<LoopExit> {
        self.running.store(false, Ordering::Release);

        let exit = self.thread.take().and_then(|thread| match thread.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                tracing::error!("production thread panicked");
                None
            }
        });

        if let Some(exit) = exit {
            tracing::debug!(
                blocks = exit.blocks_enqueued,
                reason = ?exit.reason,
                "production loop joined"
            );
        }

        self.chain.release(&self.backend);

        exit
    }
}

impl<B: NativeBackend> AudioDriver for RealtimeDriver<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<B: NativeBackend> Drop for RealtimeDriver<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<Q: BufferQueue>(
    running: &AtomicBool,
    mut producer: SampleProducer,
    mut queue: Q,
    mut block: AudioBlock,
) -> LoopExit {
    let mut blocks_enqueued = 0;

    while running.load(Ordering::Acquire) {
        producer.fill(&mut block);

        if let Err(e) = queue.enqueue(&block) {
            tracing::error!(error = %e, "error writing to native audio output");
            return LoopExit {
                blocks_enqueued,
                reason: ExitReason::Rejected,
            };
        }

        blocks_enqueued += 1;
    }

    LoopExit {
        blocks_enqueued,
        reason: ExitReason::Stopped,
    }
}

fn promote_to_realtime(
    period_frames: u32,
    sample_rate: u32,
) -> Option<audio_thread_priority::RtPriorityHandle> {
    match audio_thread_priority::promote_current_thread_to_real_time(period_frames, sample_rate) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("failed to promote production thread to realtime: {e}");
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("buffer queue was not acquired")]
struct MissingQueue;
