use std::fmt;

use crate::AudioBlock;

/// The fixed two-channel render entry point of a synthesis engine.
pub trait Synth: Send + 'static {
    /// Renders `out.len() / 2` frames, left samples at even indices and right
    /// samples at odd indices.
    fn write_interleaved(&mut self, out: &mut [f32]);
}

/// Arguments of a generic multi-channel process callback.
pub struct ProcessData<'a> {
    pub num_frames: usize,
    pub inputs: &'a [&'a [f32]],
    pub outputs: &'a mut [&'a mut [f32]],
}

pub type ProcessCallback = Box<dyn FnMut(ProcessData<'_>) + Send + 'static>;

/// Source of audio blocks for a driver. The variant is picked at
/// construction and stays fixed for the lifetime of the driver.
pub enum SampleProducer {
    Synth(Box<dyn Synth>),
    Callback(CallbackProducer),
}

impl SampleProducer {
    pub fn from_synth<S: Synth>(synth: S) -> SampleProducer {
        SampleProducer::Synth(Box::new(synth))
    }

    pub fn from_callback<F>(callback: F) -> SampleProducer
    where
        F: FnMut(ProcessData<'_>) + Send + 'static,
    {
        SampleProducer::Callback(CallbackProducer {
            callback: Box::new(callback),
            left: Vec::new(),
            right: Vec::new(),
        })
    }

    pub fn is_synth_direct(&self) -> bool {
        matches!(self, SampleProducer::Synth(_))
    }

    /// Renders one full block.
    pub fn fill(&mut self, block: &mut AudioBlock) {
        match self {
            SampleProducer::Synth(synth) => synth.write_interleaved(block),
            SampleProducer::Callback(producer) => producer.fill(block),
        }
    }
}

impl fmt::Debug for SampleProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleProducer::Synth(_) => f.write_str("SampleProducer::Synth"),
            SampleProducer::Callback(_) => f.write_str("SampleProducer::Callback"),
        }
    }
}

pub struct CallbackProducer {
    callback: ProcessCallback,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl CallbackProducer {
    fn fill(&mut self, block: &mut AudioBlock) {
        let num_frames = block.num_frames();

        // Sized on the first block, reused afterwards.
        if self.left.len() != num_frames {
            self.left.resize(num_frames, 0.0);
            self.right.resize(num_frames, 0.0);
        }

        {
            let mut outputs: [&mut [f32]; 2] = [&mut self.left, &mut self.right];
            (self.callback)(ProcessData {
                num_frames,
                inputs: &[],
                outputs: &mut outputs,
            });
        }

        interleave(&self.left, &self.right, block);
    }
}

/// Writes `left[i]` to `out[2 * i]` and `right[i]` to `out[2 * i + 1]`.
pub fn interleave(left: &[f32], right: &[f32], out: &mut [f32]) {
    for ((frame, &l), &r) in out.chunks_exact_mut(2).zip(left).zip(right) {
        frame[0] = l;
        frame[1] = r;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    struct Ramp {
        next: f32,
    }

    impl Synth for Ramp {
        fn write_interleaved(&mut self, out: &mut [f32]) {
            for frame in out.chunks_exact_mut(2) {
                frame[0] = self.next;
                frame[1] = -self.next;
                self.next += 1.0;
            }
        }
    }

    #[test]
    fn interleave_stereo() {
        let mut out = [0.0; 6];
        interleave(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &mut out);
        assert_eq!(out, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn interleave_short_output() {
        let mut out = [0.0; 4];
        interleave(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &mut out);
        assert_eq!(out, [1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn interleave_random_lengths() {
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..200 {
            let left: Vec<f32> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
            let right: Vec<f32> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
            let mut out = vec![f32::NAN; rng.gen_range(0..160)];

            interleave(&left, &right, &mut out);

            let frames = left.len().min(right.len()).min(out.len() / 2);
            for i in 0..frames {
                assert_eq!(out[2 * i], left[i]);
                assert_eq!(out[2 * i + 1], right[i]);
            }
            assert!(out[2 * frames..].iter().all(|s| s.is_nan()));
        }
    }

    #[test]
    fn synth_direct() {
        let mut producer = SampleProducer::from_synth(Ramp { next: 0.0 });
        assert!(producer.is_synth_direct());

        let mut block = AudioBlock::new(3);
        producer.fill(&mut block);
        assert_eq!(&block[..], &[0.0, -0.0, 1.0, -1.0, 2.0, -2.0]);

        producer.fill(&mut block);
        assert_eq!(&block[..], &[3.0, -3.0, 4.0, -4.0, 5.0, -5.0]);
    }

    #[test]
    fn generic_callback() {
        let mut calls = 0;
        let mut producer = SampleProducer::from_callback(move |data: ProcessData<'_>| {
            assert!(data.inputs.is_empty());
            assert_eq!(data.outputs.len(), 2);

            for i in 0..data.num_frames {
                data.outputs[0][i] = (calls * 10 + i) as f32;
                data.outputs[1][i] = -((calls * 10 + i) as f32);
            }

            calls += 1;
        });
        assert!(!producer.is_synth_direct());

        let mut block = AudioBlock::new(2);
        producer.fill(&mut block);
        assert_eq!(&block[..], &[0.0, -0.0, 1.0, -1.0]);

        producer.fill(&mut block);
        assert_eq!(&block[..], &[10.0, -10.0, 11.0, -11.0]);
    }
}
