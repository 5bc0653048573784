use clap::Parser;
use tls_recon::cli::Cli;
use tls_recon::output::write_report;
use tls_recon::TlsDataCollector;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.into_config()?;

    let mut collector = TlsDataCollector::from_config(&cfg);
    collector.collect_all().await;

    write_report(&cfg.output, &collector.report(), std::io::stdout().lock())?;
    Ok(())
}
