use clap::Parser;
use std::path::PathBuf;

use crate::input::Compression;

/// Process and validate XML files against the DTD or XML Schema they declare
#[derive(Parser, Debug, Clone)]
#[command(name = "i5validator")]
#[command(about = "Process and validate XML files against the grammar they declare")]
#[command(version)]
pub struct Cli {
    /// Input files
    #[arg(required = true, value_name = "INPUT")]
    pub input_files: Vec<PathBuf>,

    /// Report file name (default: i5validation.json)
    #[arg(short = 'L', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Use multiple threads
    #[arg(short = 'p', long = "parallel")]
    pub parallel: bool,

    /// Number of threads for --parallel (default: number of CPUs)
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Default compression; overridden by the file name extension
    #[arg(short = 'c', long = "compression", value_enum)]
    pub compression: Option<Compression>,

    /// Use DOM instead of SAX
    #[arg(short = 'd', long = "dom")]
    pub dom: bool,

    /// Use XSD from xsi:schemaLocation, ignore DTD (implies --dom)
    #[arg(short = 'S', long = "use-schema")]
    pub use_schema: bool,

    /// Collect errors and write the report file
    #[arg(short = 'l', long = "log-to-json")]
    pub log_to_json: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }
}
