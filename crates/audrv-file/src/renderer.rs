use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use audrv_core::{AudioBlock, FileOptions, FileType, SampleFormat, SampleProducer, NUM_CHANNELS};

use crate::pacer::BlockRenderer;
use crate::{Error, Result};

/// Renders blocks from a producer and writes them to a file.
pub struct FileRenderer {
    producer: SampleProducer,
    block: AudioBlock,
    writer: SampleWriter,
}

enum SampleWriter {
    Raw {
        file: BufWriter<File>,
        format: SampleFormat,
    },
    Wav {
        writer: hound::WavWriter<BufWriter<File>>,
        format: SampleFormat,
    },
}

impl FileRenderer {
    pub fn create(
        path: &Path,
        options: &FileOptions,
        period_size: usize,
        sample_rate: f64,
        producer: SampleProducer,
    ) -> Result<FileRenderer> {
        let file = File::create(path).map_err(|source| Error::Create {
            path: path.to_owned(),
            source,
        })?;
        let file = BufWriter::new(file);

        let format = options.sample_format;
        let writer = match options.file_type.resolve(path) {
            FileType::Wav => {
                let spec = hound::WavSpec {
                    channels: NUM_CHANNELS as u16,
                    sample_rate: sample_rate.round() as u32,
                    bits_per_sample: match format {
                        SampleFormat::S16 => 16,
                        SampleFormat::Float => 32,
                    },
                    sample_format: match format {
                        SampleFormat::S16 => hound::SampleFormat::Int,
                        SampleFormat::Float => hound::SampleFormat::Float,
                    },
                };

                SampleWriter::Wav {
                    writer: hound::WavWriter::new(file, spec)?,
                    format,
                }
            }
            _ => SampleWriter::Raw { file, format },
        };

        tracing::debug!(path = %path.display(), ?format, "created file renderer");

        Ok(FileRenderer {
            producer,
            block: AudioBlock::new(period_size),
            writer,
        })
    }

    /// Flushes buffered samples and, for WAV files, finalizes the header.
    pub fn finish(self) -> Result<()> {
        match self.writer {
            SampleWriter::Raw { mut file, .. } => file.flush()?,
            SampleWriter::Wav { writer, .. } => writer.finalize()?,
        }

        Ok(())
    }
}

impl BlockRenderer for FileRenderer {
    fn process_block(&mut self) -> Result<()> {
        self.producer.fill(&mut self.block);

        match &mut self.writer {
            SampleWriter::Raw {
                file,
                format: SampleFormat::S16,
            } => {
                for &sample in self.block.iter() {
                    file.write_all(&to_i16(sample).to_le_bytes())?;
                }
            }
            SampleWriter::Raw {
                file,
                format: SampleFormat::Float,
            } => {
                for &sample in self.block.iter() {
                    file.write_all(&sample.to_le_bytes())?;
                }
            }
            SampleWriter::Wav {
                writer,
                format: SampleFormat::S16,
            } => {
                for &sample in self.block.iter() {
                    writer.write_sample(to_i16(sample))?;
                }
            }
            SampleWriter::Wav {
                writer,
                format: SampleFormat::Float,
            } => {
                for &sample in self.block.iter() {
                    writer.write_sample(sample)?;
                }
            }
        }

        Ok(())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
