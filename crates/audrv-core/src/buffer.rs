use std::fmt;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};

use crate::NUM_CHANNELS;

/// One period of interleaved stereo samples.
#[derive(Clone)]
pub struct AudioBlock {
    num_frames: usize,
    data: Box<[f32]>,
}

impl AudioBlock {
    pub fn new(num_frames: usize) -> AudioBlock {
        AudioBlock {
            num_frames,
            data: vec![0.0; num_frames * NUM_CHANNELS].into(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Length of the block in bytes, as handed to a native buffer queue.
    pub fn byte_len(&self) -> usize {
        self.data.len() * size_of::<f32>()
    }
}

impl fmt::Debug for AudioBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBlock")
            .field("num_frames", &self.num_frames)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Deref for AudioBlock {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for AudioBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
