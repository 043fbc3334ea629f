pub mod buffer;
pub mod config;
pub mod driver;
mod error;
pub mod producer;
pub mod timer;

pub use self::buffer::AudioBlock;
pub use self::config::{DriverConfig, FileOptions, FileType, NativeOptions, SampleFormat};
pub use self::driver::AudioDriver;
pub use self::error::{Error, Result};
pub use self::producer::{ProcessData, SampleProducer, Synth};
pub use self::timer::Timer;

/// Every block is interleaved stereo.
pub const NUM_CHANNELS: usize = 2;
