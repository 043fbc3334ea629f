use std::io;
use std::thread::{self, JoinHandle};

/// Number of blocks the buffer queue holds.
pub const QUEUE_DEPTH: usize = 2;

/// A low-latency native audio layer built as an object graph: an engine, an
/// output mix bound to the engine, and a player reading from a buffer queue
/// and writing to the output mix.
///
/// Every `create_*` call that succeeds hands out an object which the caller
/// must later pass to the matching `destroy_*` call. Interfaces fetched from a
/// player are only valid until the player is destroyed.
pub trait NativeBackend: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Engine: Send + 'static;
    type OutputMix: Send + 'static;
    type Player: Send + 'static;
    type Play: PlayInterface<Error = Self::Error>;
    type BufferQueue: BufferQueue<Error = Self::Error>;

    fn name(&self) -> &'static str;

    fn create_engine(&self, options: &EngineOptions) -> Result<Self::Engine, Self::Error>;

    fn realize_engine(&self, engine: &mut Self::Engine) -> Result<(), Self::Error>;

    fn create_output_mix(
        &self,
        engine: &Self::Engine,
        device: Option<&str>,
    ) -> Result<Self::OutputMix, Self::Error>;

    fn realize_output_mix(&self, output_mix: &mut Self::OutputMix) -> Result<(), Self::Error>;

    fn create_player(
        &self,
        engine: &Self::Engine,
        output_mix: &Self::OutputMix,
        desc: &PlayerDesc,
    ) -> Result<Self::Player, Self::Error>;

    fn realize_player(&self, player: &mut Self::Player) -> Result<(), Self::Error>;

    fn play_interface(&self, player: &mut Self::Player) -> Result<Self::Play, Self::Error>;

    fn buffer_queue(&self, player: &mut Self::Player) -> Result<Self::BufferQueue, Self::Error>;

    fn destroy_player(&self, player: Self::Player);

    fn destroy_output_mix(&self, output_mix: Self::OutputMix);

    fn destroy_engine(&self, engine: Self::Engine);

    /// Spawns the production thread. Backends that need per-thread setup
    /// wrap `f`.
    fn spawn_thread<F, T>(&self, name: &str, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        thread::Builder::new().name(name.into()).spawn(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayState {
    Stopped,
    Paused,
    Playing,
}

pub trait PlayInterface: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_play_state(&mut self, state: PlayState) -> Result<(), Self::Error>;
}

pub trait BufferQueue: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Queues one interleaved block. Returns once the block is accepted; the
    /// queue's depth is the only backpressure the producer sees.
    fn enqueue(&mut self, block: &[f32]) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub app_name: String,
    pub server: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDesc {
    pub source: DataSource,
    pub media_role: String,
    /// Requested latency in frames, if the native layer should adjust it.
    pub latency: Option<u32>,
}

/// A buffer-queue locator together with the PCM layout of the queued blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSource {
    pub queue_depth: usize,
    pub frames_per_buffer: usize,
    pub format: PcmFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u32,
    pub sample_rate: u32,
    pub sample_format: PcmSampleFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmSampleFormat {
    F32Le,
}
