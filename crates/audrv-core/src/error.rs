use std::io;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
