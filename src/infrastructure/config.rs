//! Runtime configuration
//!
//! Loaded from `tierup.toml` (every section optional) and adjustable through
//! `TIERUP_*` environment variables.

use crate::errors::ConfigError;
use crate::infrastructure::logging::{LogConfig, LogFormat, LogOutput};
use crate::tiering::policy::Thresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::Level;

pub const CONFIG_FILE: &str = "tierup.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TieringConfig {
    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Compile worker count; fixed once the pool exists.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub span_events: bool,

    #[serde(default)]
    pub filter: Option<String>,

    /// Log to daily-rotated files here instead of stderr.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_thread_prefix() -> String {
    "tierup-compiler".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            thread_prefix: default_thread_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            span_events: false,
            filter: None,
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level: Level = self
            .level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level: {}", self.level)))?;

        let output = match &self.directory {
            Some(directory) => LogOutput::File {
                directory: directory.clone(),
                prefix: "tierup".to_string(),
            },
            None => LogOutput::Stderr,
        };

        Ok(LogConfig {
            level,
            format: self.format,
            output,
            span_events: self.span_events,
            filter: self.filter.clone(),
        })
    }
}

impl TieringConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Walk from the current directory up to the root looking for `tierup.toml`.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Like `discover`, starting at `start` instead of the current directory.
    pub fn discover_from(start: &Path) -> Result<Self, ConfigError> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.scheduler.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".to_string()));
        }
        self.logging.to_log_config()?;
        Ok(())
    }

    /// Apply `TIERUP_WORKERS` and `TIERUP_{L1,L2}_{TRIGGER,DEADLINE}`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse_num<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{} is not a number: {}", key, raw)))
        }

        if let Some(raw) = lookup("TIERUP_WORKERS") {
            self.scheduler.workers = parse_num("TIERUP_WORKERS", raw)?;
        }

        let thresholds = &mut self.thresholds;
        let slots: [(&str, &mut u64); 4] = [
            ("TIERUP_L1_TRIGGER", &mut thresholds.l1_trigger),
            ("TIERUP_L1_DEADLINE", &mut thresholds.l1_deadline),
            ("TIERUP_L2_TRIGGER", &mut thresholds.l2_trigger),
            ("TIERUP_L2_DEADLINE", &mut thresholds.l2_deadline),
        ];
        for (key, slot) in slots {
            if let Some(raw) = lookup(key) {
                *slot = parse_num(key, raw)?;
            }
        }

        self.validate()?;
        Ok(self)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
