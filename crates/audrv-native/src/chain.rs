use std::fmt;

use crate::backend::{NativeBackend, PlayInterface, PlayState, PlayerDesc};
use crate::{EngineOptions, Error, Result};

/// Construction steps of the realtime sink, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    CreateEngine,
    RealizeEngine,
    CreateOutputMix,
    RealizeOutputMix,
    CreatePlayer,
    RealizePlayer,
    PlayInterface,
    BufferQueueInterface,
    SetPlaying,
    SpawnThread,
}

impl Step {
    pub const ALL: [Step; 10] = [
        Step::CreateEngine,
        Step::RealizeEngine,
        Step::CreateOutputMix,
        Step::RealizeOutputMix,
        Step::CreatePlayer,
        Step::RealizePlayer,
        Step::PlayInterface,
        Step::BufferQueueInterface,
        Step::SetPlaying,
        Step::SpawnThread,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::CreateEngine => "create engine",
            Step::RealizeEngine => "realize engine",
            Step::CreateOutputMix => "create output mix",
            Step::RealizeOutputMix => "realize output mix",
            Step::CreatePlayer => "create player",
            Step::RealizePlayer => "realize player",
            Step::PlayInterface => "get play interface",
            Step::BufferQueueInterface => "get buffer queue interface",
            Step::SetPlaying => "set play state",
            Step::SpawnThread => "spawn production thread",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native objects of one realtime sink.
///
/// The engine owns the output mix, the player references the output mix and
/// owns its interfaces. Any prefix of the chain may be set; [`release`]
/// destroys whatever is set, in reverse acquisition order.
///
/// [`release`]: HandleChain::release
pub struct HandleChain<B: NativeBackend> {
    engine: Option<B::Engine>,
    output_mix: Option<B::OutputMix>,
    player: Option<B::Player>,
    play: Option<B::Play>,
    buffer_queue: Option<B::BufferQueue>,
}

impl<B: NativeBackend> Default for HandleChain<B> {
    fn default() -> Self {
        HandleChain {
            engine: None,
            output_mix: None,
            player: None,
            play: None,
            buffer_queue: None,
        }
    }
}

impl<B: NativeBackend> HandleChain<B> {
    pub fn new() -> HandleChain<B> {
        HandleChain::default()
    }

    /// Acquires the whole chain and starts playback. On error the handles
    /// acquired so far stay in the chain until [`release`](Self::release).
    pub fn acquire(
        &mut self,
        backend: &B,
        options: &EngineOptions,
        device: Option<&str>,
        desc: &PlayerDesc,
    ) -> Result<()> {
        let engine = self
            .engine
            .insert(check(Step::CreateEngine, backend.create_engine(options))?);
        check(Step::RealizeEngine, backend.realize_engine(engine))?;

        let output_mix = self.output_mix.insert(check(
            Step::CreateOutputMix,
            backend.create_output_mix(engine, device),
        )?);
        check(
            Step::RealizeOutputMix,
            backend.realize_output_mix(output_mix),
        )?;

        let player = self.player.insert(check(
            Step::CreatePlayer,
            backend.create_player(engine, output_mix, desc),
        )?);
        check(Step::RealizePlayer, backend.realize_player(player))?;

        let play = self
            .play
            .insert(check(Step::PlayInterface, backend.play_interface(player))?);
        self.buffer_queue = Some(check(
            Step::BufferQueueInterface,
            backend.buffer_queue(player),
        )?);

        check(Step::SetPlaying, play.set_play_state(PlayState::Playing))?;

        Ok(())
    }

    pub fn take_buffer_queue(&mut self) -> Option<B::BufferQueue> {
        self.buffer_queue.take()
    }

    /// Destroys the player, then the output mix, then the engine, skipping
    /// the ones that were never acquired. Safe to call repeatedly.
    pub fn release(&mut self, backend: &B) {
        self.buffer_queue = None;
        self.play = None;

        if let Some(player) = self.player.take() {
            tracing::debug!("destroying player");
            backend.destroy_player(player);
        }

        if let Some(output_mix) = self.output_mix.take() {
            tracing::debug!("destroying output mix");
            backend.destroy_output_mix(output_mix);
        }

        if let Some(engine) = self.engine.take() {
            tracing::debug!("destroying engine");
            backend.destroy_engine(engine);
        }
    }
}

fn check<T, E>(step: Step, result: Result<T, E>) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(v) => {
            tracing::debug!(%step, "ok");
            Ok(v)
        }
        Err(e) => {
            tracing::error!(%step, error = %e, "native audio layer failed");
            Err(Error::native(step, e))
        }
    }
}
