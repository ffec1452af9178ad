use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default reports directory, relative to the working directory.
pub const DEFAULT_REPORTS_DIR: &str = ".gooze-reports";

/// Default log file.
pub const DEFAULT_LOG_FILENAME: &str = ".gooze.log";

/// Default per-mutation test timeout.
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Config file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "gooze.toml";

const ENV_PREFIX: &str = "GOOZE_";

/// Shape of `gooze.toml`. Every field is optional; missing values fall back
/// to environment variables and then built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub output: Option<String>,
    #[serde(rename = "no-cache")]
    pub no_cache: Option<bool>,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    pub parallel: Option<usize>,
    #[serde(rename = "mutation-timeout")]
    pub mutation_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    pub filename: Option<String>,
    pub verbose: Option<bool>,
}

/// Effective settings after merging defaults, config file, environment and
/// CLI flags. Flags win over env; env wins over the file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output: PathBuf,
    pub no_cache: bool,
    pub exclude: Vec<String>,
    pub parallel: usize,
    pub mutation_timeout: Duration,
    pub log_filename: PathBuf,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output: PathBuf::from(DEFAULT_REPORTS_DIR),
            no_cache: false,
            exclude: Vec::new(),
            parallel: 1,
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
            log_filename: PathBuf::from(DEFAULT_LOG_FILENAME),
            verbose: false,
        }
    }
}

impl Settings {
    /// Load settings from `gooze.toml` in `dir` (if present) and `GOOZE_*`
    /// environment variables. CLI flags are applied by the caller on top.
    pub fn load(dir: &Path) -> Result<Settings> {
        let mut settings = Settings::default();

        let config_path = dir.join(CONFIG_FILENAME);
        if config_path.is_file() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("read {}", config_path.display()))?;
            let file: FileConfig = toml::from_str(&contents)
                .with_context(|| format!("parse {}", config_path.display()))?;
            settings.apply_file(file);
        }

        settings.apply_env();

        Ok(settings)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(output) = file.output {
            self.output = PathBuf::from(output);
        }
        if let Some(no_cache) = file.no_cache {
            self.no_cache = no_cache;
        }
        if let Some(exclude) = file.paths.exclude {
            self.exclude = exclude;
        }
        if let Some(parallel) = file.run.parallel {
            self.parallel = parallel;
        }
        if let Some(secs) = file.run.mutation_timeout_secs {
            self.mutation_timeout = Duration::from_secs(secs);
        }
        if let Some(filename) = file.log.filename {
            self.log_filename = PathBuf::from(filename);
        }
        if let Some(verbose) = file.log.verbose {
            self.verbose = verbose;
        }
    }

    /// Environment keys mirror config keys with dots and dashes mapped to
    /// underscores: `GOOZE_OUTPUT`, `GOOZE_NO_CACHE`, `GOOZE_PATHS_EXCLUDE`
    /// (comma separated), `GOOZE_RUN_PARALLEL`,
    /// `GOOZE_RUN_MUTATION_TIMEOUT`, `GOOZE_LOG_FILENAME`,
    /// `GOOZE_LOG_VERBOSE`.
    fn apply_env(&mut self) {
        if let Some(output) = env_var("OUTPUT") {
            self.output = PathBuf::from(output);
        }
        if let Some(no_cache) = env_var("NO_CACHE").and_then(parse_bool) {
            self.no_cache = no_cache;
        }
        if let Some(exclude) = env_var("PATHS_EXCLUDE") {
            self.exclude = exclude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(parallel) = env_var("RUN_PARALLEL").and_then(|v| v.parse().ok()) {
            self.parallel = parallel;
        }
        if let Some(secs) = env_var("RUN_MUTATION_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.mutation_timeout = Duration::from_secs(secs);
        }
        if let Some(filename) = env_var("LOG_FILENAME") {
            self.log_filename = PathBuf::from(filename);
        }
        if let Some(verbose) = env_var("LOG_VERBOSE").and_then(parse_bool) {
            self.verbose = verbose;
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: String) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Route tracing output to the log file so progress rendering stays clean.
/// `verbose` lowers the filter to DEBUG.
pub fn init_logging(log_path: &Path, verbose: bool) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.output, PathBuf::from(".gooze-reports"));
        assert!(!s.no_cache);
        assert_eq!(s.parallel, 1);
        assert_eq!(s.mutation_timeout, Duration::from_secs(120));
    }

    #[test]
    fn file_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"
output = "reports"
no-cache = true

[paths]
exclude = ["generated\\.go$"]

[run]
parallel = 4
mutation-timeout = 30
"#,
        )
        .unwrap();

        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s.output, PathBuf::from("reports"));
        assert!(s.no_cache);
        assert_eq!(s.exclude, vec!["generated\\.go$".to_string()]);
        assert_eq!(s.parallel, 4);
        assert_eq!(s.mutation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("true".into()), Some(true));
        assert_eq!(parse_bool("0".into()), Some(false));
        assert_eq!(parse_bool("maybe".into()), None);
    }
}
