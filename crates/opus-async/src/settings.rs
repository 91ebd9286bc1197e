//! Settings file for the command-line tool.
//!
//! ```toml
//! [runtime]
//! workers = 4
//! queue_capacity = 64
//!
//! [encoder]
//! bitrate = 96000
//! voice = false
//! frame_ms = 20
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use job_runtime::RuntimeConfig;
use job_runtime::config::RuntimeConfigFile;
use serde::Deserialize;

/// Frame durations (ms) accepted for encoding.
pub const FRAME_DURATIONS_MS: [u32; 4] = [10, 20, 40, 60];

/// Encoder defaults applied when the command line does not override them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Target bitrate in bits per second; `<= 0` means maximum.
    pub bitrate: i32,
    /// Use the speech-optimized profile.
    pub voice: bool,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: -1,
            voice: false,
            frame_ms: 20,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub runtime: RuntimeConfig,
    pub encoder: EncoderSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    runtime: Option<RuntimeConfigFile>,
    encoder: Option<EncoderSettingsFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncoderSettingsFile {
    bitrate: Option<i32>,
    voice: Option<bool>,
    frame_ms: Option<u32>,
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read settings {:?}", path))?;
                Self::from_toml_str(&raw).with_context(|| format!("load settings {:?}", path))
            }
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(raw).context("parse settings")?;
        let mut settings = Self::default();
        if let Some(runtime) = file.runtime {
            settings.runtime = settings.runtime.merged(runtime);
        }
        if let Some(encoder) = file.encoder {
            if let Some(bitrate) = encoder.bitrate {
                settings.encoder.bitrate = bitrate;
            }
            if let Some(voice) = encoder.voice {
                settings.encoder.voice = voice;
            }
            if let Some(frame_ms) = encoder.frame_ms {
                settings.encoder.frame_ms = frame_ms;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        validate_frame_ms(self.encoder.frame_ms)
    }
}

pub fn validate_frame_ms(frame_ms: u32) -> Result<()> {
    if !FRAME_DURATIONS_MS.contains(&frame_ms) {
        bail!("frame_ms must be one of {FRAME_DURATIONS_MS:?}, got {frame_ms}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_encode_at_max_bitrate_in_20ms_frames() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.encoder, EncoderSettings::default());
        assert_eq!(s.encoder.bitrate, -1);
        assert_eq!(s.encoder.frame_ms, 20);
    }

    #[test]
    fn from_toml_str_reads_both_tables() {
        let s = Settings::from_toml_str(
            "[runtime]\nworkers = 3\n\n[encoder]\nbitrate = 32000\nvoice = true\nframe_ms = 60\n",
        )
        .unwrap();
        assert_eq!(s.runtime.workers, 3);
        assert_eq!(
            s.encoder,
            EncoderSettings {
                bitrate: 32_000,
                voice: true,
                frame_ms: 60,
            }
        );
    }

    #[test]
    fn from_toml_str_rejects_bad_frame_duration() {
        let err = Settings::from_toml_str("[encoder]\nframe_ms = 25\n").unwrap_err();
        assert!(format!("{err:#}").contains("frame_ms"));
    }

    #[test]
    fn from_toml_str_rejects_invalid_runtime() {
        assert!(Settings::from_toml_str("[runtime]\nworkers = 0\n").is_err());
    }

    #[test]
    fn from_toml_str_rejects_unknown_table() {
        assert!(Settings::from_toml_str("[decoder]\nfec = true\n").is_err());
    }
}
