use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] audrv_core::Error),

    #[error("no file name specified")]
    NoFileName,

    #[error("failed to create {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("io error")]
    Io(#[from] io::Error),

    #[error("wav error")]
    Wav(#[from] hound::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
