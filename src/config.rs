use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Validate structure and return placeholders without touching state.
    #[serde(default)]
    pub dry_run: bool,

    /// Run each object's refresh hook before instance reads and calls.
    #[serde(default = "default_true")]
    pub refresh_entities: bool,

    /// Upper bound for a single refresh hook. `None` waits indefinitely.
    #[serde(default)]
    pub refresh_timeout_ms: Option<u64>,

    /// Nesting limit of `describe`; deeper objects render as their identity.
    #[serde(default = "default_max_describe_depth")]
    pub max_describe_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            refresh_entities: default_true(),
            refresh_timeout_ms: None,
            max_describe_depth: default_max_describe_depth(),
        }
    }
}

impl InterpreterConfig {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_ms.map(Duration::from_millis)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_true() -> bool {
    true
}

fn default_max_describe_depth() -> usize {
    8
}
