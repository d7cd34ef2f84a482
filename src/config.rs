use crate::error::VcsError;
use log::{debug, info};
use std::env;
use std::fs;
use std::path::Path;

pub const DEBUG_ENV: &str = "PACMAN_DEBUG";

/// Process-wide settings, read once at startup and handed to the runner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Trace every external command before it is started.
    pub debug: bool,
}

impl Config {
    /// Reads a properties file made of `key=value` lines. Blank lines and
    /// `#` comments are skipped, unknown keys are ignored.
    pub fn from_file(path: &Path) -> Result<Self, VcsError> {
        info!("Reading config file: {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| VcsError::ConfigRead(path.display().to_string(), e))?;
        Ok(Self::parse(&content))
    }

    pub fn from_env() -> Self {
        let debug = env::var(DEBUG_ENV)
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);
        Config { debug }
    }

    fn parse(content: &str) -> Self {
        let mut config = Config::default();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring malformed config line: {}", line);
                continue;
            };
            match key.trim() {
                "debug" => match parse_bool(value) {
                    Some(flag) => config.debug = flag,
                    None => debug!("Ignoring non-boolean debug value: {}", value.trim()),
                },
                other => debug!("Ignoring unknown config key: {}", other),
            }
        }
        config
    }

    /// Combines two configurations; a setting enabled in either stays enabled.
    pub fn merge(self, other: Config) -> Config {
        Config {
            debug: self.debug || other.debug,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
