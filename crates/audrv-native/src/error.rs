use std::io;

use crate::Step;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] audrv_core::Error),

    #[error("native audio layer failed: {step}")]
    Native {
        step: Step,
        #[source]
        source: BoxError,
    },

    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),
}

impl Error {
    #[cold]
    pub fn native<E>(step: Step, error: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Native {
            step,
            source: Box::new(error),
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Native { step, .. } => Some(*step),
            Error::ThreadSpawn(_) => Some(Step::SpawnThread),
            Error::Config(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
