use clap::Parser;
use dimorphism_site::{BuildConfig, CliArgs, LoggingConfig, init_logging, run_build};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let config = BuildConfig::from_args(cli)?;

    // Fail before touching the network.
    config.validate()?;

    let report = run_build(config).await?;
    for failure in &report.failures {
        tracing::debug!(
            artifact = failure.artifact,
            type_file = %failure.type_file,
            message = %failure.message,
            "missing artifact"
        );
    }
    Ok(())
}
