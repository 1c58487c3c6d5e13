use std::process;
use std::time::Instant;

use anyhow::{Context, Result};

use i5validator::{BatchCoordinator, Cli, ConfigManager, Document, LibXml2Parser, Output};

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse_args();
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(&cli).context("Failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.verbosity().log_filter()),
    )
    .init();

    let documents: Vec<Document> = cli
        .input_files
        .iter()
        .map(|path| Document::from_path(path, config.input.compression))
        .collect();

    let coordinator = BatchCoordinator::new(LibXml2Parser::new(), config.batch_config());

    let start = Instant::now();
    let result = coordinator.run_batch(&documents)?;
    let duration = start.elapsed();

    if config.report.enabled {
        result
            .report
            .write_json(&config.report.path)
            .with_context(|| format!("Failed to write {}", config.report.path.display()))?;
    }

    Output::new(config.verbosity()).print(&result, duration);

    Ok(result.failure_count.min(255) as i32)
}
