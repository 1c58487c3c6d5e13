use crate::batch::{BatchConfig, Execution};
use crate::cli::Cli;
use crate::input::Compression;
use crate::parser::{ParseMode, ParseOptions, SchemaPreference};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_REPORT_PATH: &str = "i5validation.json";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub report: ReportConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    pub mode: ParseMode,
    pub schema: SchemaPreference,
    /// Validate documents on a worker pool
    pub parallel: bool,
    /// Worker count for parallel runs, defaults to the number of CPUs
    pub threads: Option<usize>,
}

/// Report file configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Collect per-document errors and write them to `path`
    pub enabled: bool,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct InputConfig {
    /// Used for files whose extension names no compression
    pub compression: Compression,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    Quiet,
    Normal,
    Verbose,
}

impl VerbosityLevel {
    /// Default `env_logger` filter for this level; `RUST_LOG` takes precedence
    pub fn log_filter(self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

impl Config {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.output.quiet {
            VerbosityLevel::Quiet
        } else if self.output.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Effective worker count for parallel runs
    pub fn thread_count(&self) -> usize {
        self.validation.threads.unwrap_or_else(num_cpus::get)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::new(self.validation.mode, self.validation.schema)
    }

    pub fn batch_config(&self) -> BatchConfig {
        let execution = if self.validation.parallel {
            Execution::Parallel {
                threads: self.thread_count(),
            }
        } else {
            Execution::Sequential
        };
        BatchConfig {
            execution,
            options: self.parse_options(),
            record_errors: self.report.enabled,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli)
    }

    pub fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path)?,
            None => Self::find_config_file()?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a configuration file in the working directory, then in the user config directory
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "i5validator.toml",
            "i5validator.json",
            ".i5validator.toml",
            ".i5validator.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("i5validator");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(mode) = env.get("I5VALIDATOR_MODE") {
            config.validation.mode = match mode.to_lowercase().as_str() {
                "sax" => ParseMode::Sax,
                "dom" => ParseMode::Dom,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid I5VALIDATOR_MODE value: {}",
                        mode
                    )));
                }
            };
        }

        if let Some(schema) = env.get("I5VALIDATOR_SCHEMA") {
            config.validation.schema = match schema.to_lowercase().as_str() {
                "dtd" => SchemaPreference::Dtd,
                "xsd" => SchemaPreference::Xsd,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid I5VALIDATOR_SCHEMA value: {}",
                        schema
                    )));
                }
            };
        }

        if let Some(parallel) = env.get("I5VALIDATOR_PARALLEL") {
            config.validation.parallel = parse_env("I5VALIDATOR_PARALLEL", &parallel)?;
        }

        if let Some(threads) = env.get("I5VALIDATOR_THREADS") {
            config.validation.threads = Some(parse_env("I5VALIDATOR_THREADS", &threads)?);
        }

        if let Some(report) = env.get("I5VALIDATOR_REPORT") {
            config.report.enabled = parse_env("I5VALIDATOR_REPORT", &report)?;
        }

        if let Some(path) = env.get("I5VALIDATOR_REPORT_PATH") {
            config.report.path = PathBuf::from(path);
        }

        if let Some(compression) = env.get("I5VALIDATOR_COMPRESSION") {
            config.input.compression = match compression.to_lowercase().as_str() {
                "none" => Compression::None,
                "gzip" => Compression::Gzip,
                "bzip2" => Compression::Bzip2,
                "xz" => Compression::Xz,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid I5VALIDATOR_COMPRESSION value: {}",
                        compression
                    )));
                }
            };
        }

        if let Some(verbose) = env.get("I5VALIDATOR_VERBOSE") {
            config.output.verbose = parse_env("I5VALIDATOR_VERBOSE", &verbose)?;
        }

        if let Some(quiet) = env.get("I5VALIDATOR_QUIET") {
            config.output.quiet = parse_env("I5VALIDATOR_QUIET", &quiet)?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence).
    ///
    /// Flags only ever switch a setting on; an absent flag keeps the configured value.
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if cli.dom {
            config.validation.mode = ParseMode::Dom;
        }
        if cli.use_schema {
            config.validation.schema = SchemaPreference::Xsd;
            config.validation.mode = ParseMode::Dom;
        }
        if cli.parallel {
            config.validation.parallel = true;
        }
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }

        if cli.log_to_json {
            config.report.enabled = true;
        }
        if let Some(log_file) = &cli.log_file {
            config.report.path = log_file.clone();
        }

        if let Some(compression) = cli.compression {
            config.input.compression = compression;
        }

        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.report.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Report path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
}
