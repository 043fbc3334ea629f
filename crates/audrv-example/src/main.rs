use std::time::Duration;

use audrv_core::{AudioDriver, DriverConfig, SampleProducer, Synth};
use audrv_file::FileDriver;
use audrv_native::RealtimeDriver;
use tracing_subscriber::EnvFilter;

struct Saw {
    freq: f32,
    sample_rate: f32,
    time: f32,
}

impl Synth for Saw {
    fn write_interleaved(&mut self, out: &mut [f32]) {
        for frame in out.chunks_exact_mut(2) {
            let x = self.time / self.sample_rate * self.freq;
            let y = 2.0 * (x - (0.5 + x).floor());
            frame[0] = y * 0.5;
            frame[1] = y * 0.5;
            self.time += 1.0;
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().unwrap_or_else(|| "file".into());

    let mut config = DriverConfig::default();
    if let Some(path) = args.next() {
        config.file.path = Some(path.into());
    }

    let synth = Saw {
        freq: 40.0,
        sample_rate: config.sample_rate as f32,
        time: 0.0,
    };
    let producer = SampleProducer::from_synth(synth);

    let driver: Box<dyn AudioDriver> = match kind.as_str() {
        "file" => match FileDriver::new(&config, producer) {
            Ok(driver) => Box::new(driver),
            Err(e) => {
                tracing::error!(error = %e, "failed to start file driver");
                return;
            }
        },
        "pipewire" => {
            match RealtimeDriver::new(audrv_pipewire::Backend::new(), &config, producer) {
                Ok(driver) => Box::new(driver),
                Err(e) => {
                    let step = e.step();
                    tracing::error!(error = %e, ?step, "failed to start pipewire driver");
                    return;
                }
            }
        }
        _ => {
            eprintln!("usage: audrv-example [file|pipewire] [PATH]");
            return;
        }
    };

    std::thread::sleep(Duration::from_secs(5));

    if !driver.is_running() {
        tracing::warn!("{} driver stopped early", driver.name());
    }
}
