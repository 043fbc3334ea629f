use std::io;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),

    #[error("thread crashed")]
    ThreadCrashed,

    #[error("engine is not realized")]
    NotRealized,

    #[error("invalid object ID")]
    InvalidId,

    #[error("buffer queue already taken")]
    QueueTaken,

    #[error("buffer queue stalled")]
    QueueStalled,

    #[error("block does not fit the buffer queue")]
    BlockTooLarge,

    #[error("too many channels")]
    TooManyChannels,

    #[error("invalid format pod")]
    InvalidPod,

    #[error(transparent)]
    Pipewire(#[from] pipewire::Error),

    #[error(transparent)]
    Spa(#[from] pipewire::spa::utils::result::Error),

    #[error("serialization error")]
    Serialization(#[from] pipewire::spa::pod::serialize::GenError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
