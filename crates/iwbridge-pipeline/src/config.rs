//! Batch configuration
//!
//! ```toml
//! output_dir = "converted"
//! workers = 8
//! force = false
//! on_hash_mismatch = "reconvert"
//!
//! [retry]
//! max_attempts = 4
//! initial_backoff_ms = 50
//!
//! [texture]
//! target = "auto"
//! png_preview = true
//!
//! [audio]
//! sample_rate = 22050
//! quality = "exhaustive"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iwbridge_catalog::DEFAULT_DB_NAME;
use iwbridge_core::{Error, Result};
use iwbridge_export::{AudioSettings, ExportSettings, MeshSettings, PhysicsSettings, TextureSettings};
use iwbridge_parsers::ParseOptions;

/// What to do when a source's hash differs from the catalog's record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Convert again and replace the recorded entry, with a warning
    #[default]
    Reconvert,
    /// Leave the recorded artifacts alone and report the asset as skipped
    Keep,
}

/// Bounded exponential backoff for transient catalog failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Everything `convert_batch` needs besides the source paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Root of the `Textures/`, `Meshes/`, `Audio/` and `Physics/` folders
    pub output_dir: PathBuf,
    /// Catalog database; defaults to `<output_dir>/catalog.db`
    pub catalog_path: Option<PathBuf>,
    /// Worker threads; defaults to the available cores
    pub workers: Option<usize>,
    pub retry: RetryPolicy,
    pub on_hash_mismatch: MismatchPolicy,
    /// Reconvert and replace even when the recorded hash matches
    pub force: bool,
    /// Reject chunks that do not belong to the container's kind
    pub strict_validation: bool,
    /// Write `report.json` into the output directory after each batch
    pub write_report: bool,
    pub texture: TextureSettings,
    pub mesh: MeshSettings,
    pub audio: AudioSettings,
    pub physics: PhysicsSettings,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("converted"),
            catalog_path: None,
            workers: None,
            retry: RetryPolicy::default(),
            on_hash_mismatch: MismatchPolicy::default(),
            force: false,
            strict_validation: false,
            write_report: false,
            texture: TextureSettings::default(),
            mesh: MeshSettings::default(),
            audio: AudioSettings::default(),
            physics: PhysicsSettings::default(),
        }
    }
}

impl TargetConfig {
    /// Load a TOML file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.output_dir.as_os_str().is_empty() {
            return invalid("output_dir must not be empty");
        }
        if self.workers == Some(0) {
            return invalid("workers must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be a finite value >= 1");
        }
        if self.audio.sample_rate == Some(0) {
            return invalid("audio.sample_rate must be positive");
        }
        if !(self.mesh.unit_scale.is_finite() && self.mesh.unit_scale > 0.0)
            || !(self.physics.unit_scale.is_finite() && self.physics.unit_scale > 0.0)
        {
            return invalid("unit_scale must be a positive finite number");
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_DB_NAME))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            texture: self.texture.clone(),
            mesh: self.mesh.clone(),
            audio: self.audio.clone(),
            physics: self.physics.clone(),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict_validation: self.strict_validation,
            ..ParseOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_core::ErrorKind;
    use iwbridge_export::{AdpcmQuality, TargetFormat};

    #[test]
    fn test_partial_toml() {
        let config = TargetConfig::from_toml(
            r#"
            output_dir = "out"
            workers = 2
            on_hash_mismatch = "keep"

            [texture]
            target = "bc5"

            [audio]
            sample_rate = 22050
            quality = "fast"
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.worker_count(), 2);
        assert_eq!(config.on_hash_mismatch, MismatchPolicy::Keep);
        assert_eq!(config.texture.target, TargetFormat::Bc5);
        assert_eq!(config.audio.quality, AdpcmQuality::Fast);
        assert_eq!(config.catalog_path(), PathBuf::from("out/catalog.db"));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_invalid_values() {
        for text in ["workers = 0", "[retry]\nmax_attempts = 0", "output_dir = 5", "[audio]\nsample_rate = 0"] {
            let err = TargetConfig::from_toml(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig, "{text}");
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TargetConfig {
            workers: Some(3),
            force: true,
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(TargetConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(20), Duration::from_millis(2_000));
    }
}
