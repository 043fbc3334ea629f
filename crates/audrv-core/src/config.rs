use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings snapshot a driver reads once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Frames per block.
    pub period_size: usize,
    /// Frames per second.
    pub sample_rate: f64,
    /// Realtime priority hint for the production thread. Zero or less disables promotion.
    pub realtime_prio: i32,
    pub native: NativeOptions,
    pub file: FileOptions,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            period_size: 64,
            sample_rate: 44100.0,
            realtime_prio: 60,
            native: NativeOptions::default(),
            file: FileOptions::default(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period_size == 0 {
            return Err(Error::InvalidConfig("period size must be positive"));
        }

        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(Error::InvalidConfig("sample rate must be positive"));
        }

        Ok(())
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate.round() as u32
    }
}

/// Selectors for the realtime sink. `"default"` lets the platform choose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeOptions {
    pub server: String,
    pub device: String,
    pub media_role: String,
    pub adjust_latency: bool,
}

impl Default for NativeOptions {
    fn default() -> NativeOptions {
        NativeOptions {
            server: "default".into(),
            device: "default".into(),
            media_role: "music".into(),
            adjust_latency: true,
        }
    }
}

impl NativeOptions {
    pub fn server(&self) -> Option<&str> {
        non_default(&self.server)
    }

    pub fn device(&self) -> Option<&str> {
        non_default(&self.device)
    }
}

fn non_default(selector: &str) -> Option<&str> {
    match selector {
        "" | "default" => None,
        v => Some(v),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub path: Option<PathBuf>,
    pub file_type: FileType,
    pub sample_format: SampleFormat,
}

impl Default for FileOptions {
    fn default() -> FileOptions {
        FileOptions {
            path: Some(PathBuf::from("audrv.raw")),
            file_type: FileType::Auto,
            sample_format: SampleFormat::S16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Chosen from the file extension.
    Auto,
    Raw,
    Wav,
}

impl FileType {
    pub fn resolve(self, path: &Path) -> FileType {
        match self {
            FileType::Auto => match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("wav") => FileType::Wav,
                _ => FileType::Raw,
            },
            v => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S16,
    Float,
}
