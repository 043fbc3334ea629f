mod driver;
mod error;
mod pacer;
mod renderer;

pub use self::driver::FileDriver;
pub use self::error::{Error, Result};
pub use self::pacer::{tick_interval_ms, BlockRenderer, Pacer, TickOutcome};
pub use self::renderer::FileRenderer;
