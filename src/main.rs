use clap::Parser;
use hive::cli::{self, Cli};
use hive::config::AppConfig;
use hive::logging::init_logging;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: failed to load config from {} ({}), using defaults", cli.config, e);
            AppConfig::default_config()
        }
    };
    let _log_guard = init_logging(&config.logging);

    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("Invalid configuration: {}", problem);
        }
        anyhow::bail!("configuration has {} problem(s)", problems.len());
    }

    cli::run(cli, config).await
}
