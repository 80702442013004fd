// Runtime configuration resolved from the environment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    APP_DATA_FOLDER, DB_FILENAME, ENV_DATA_DIR, ENV_DEBOUNCE_MS, ENV_THUMB_OFFSET,
    PROGRESS_DEBOUNCE_MS, THUMB_DEFAULT_OFFSET_SECS,
};
use crate::error::{Result, ShelfError};

#[derive(Debug, Clone)]
pub struct ShelfConfig {
    /// Directory holding the metadata database.
    pub data_dir: PathBuf,
    /// Trailing delay before a progress update is persisted.
    pub progress_debounce: Duration,
    /// Preferred thumbnail seek offset, in seconds.
    pub thumb_offset_secs: f64,
}

impl ShelfConfig {
    /// Build the config from environment overrides, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = match env::var(ENV_DATA_DIR) {
            Ok(v) if !v.trim().is_empty() => PathBuf::from(v),
            _ => default_data_dir()?,
        };

        let progress_debounce = env::var(ENV_DEBOUNCE_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(PROGRESS_DEBOUNCE_MS));

        let thumb_offset_secs = env::var(ENV_THUMB_OFFSET)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(THUMB_DEFAULT_OFFSET_SECS);

        Ok(Self {
            data_dir,
            progress_debounce,
            thumb_offset_secs,
        })
    }

    /// Config rooted at an explicit data directory, with default tuning.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            progress_debounce: Duration::from_millis(PROGRESS_DEBOUNCE_MS),
            thumb_offset_secs: THUMB_DEFAULT_OFFSET_SECS,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new()
        .ok_or_else(|| ShelfError::Other("Cannot determine home directory".to_string()))?;
    Ok(base.home_dir().join(APP_DATA_FOLDER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_data_dir_defaults() {
        let cfg = ShelfConfig::with_data_dir("/tmp/shelf");
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/shelf").join(DB_FILENAME));
        assert_eq!(cfg.progress_debounce, Duration::from_millis(1000));
        assert!((cfg.thumb_offset_secs - 1.0).abs() < f64::EPSILON);
    }
}
