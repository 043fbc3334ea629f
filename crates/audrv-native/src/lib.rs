mod backend;
mod chain;
mod driver;
mod error;


pub use self::backend::{
    BufferQueue, DataSource, EngineOptions, NativeBackend, PcmFormat, PcmSampleFormat,
    PlayInterface, PlayState, PlayerDesc, QUEUE_DEPTH,
};
pub use self::chain::{HandleChain, Step};
pub use self::driver::{ExitReason, LoopExit, RealtimeDriver};
pub use self::error::{Error, Result};
