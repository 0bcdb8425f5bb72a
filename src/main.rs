use clap::Parser;
use updown_tracker::cli::{once, Cli, Commands};
use updown_tracker::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Slug printing needs neither config nor logging
    if let Commands::Slug(args) = &cli.command {
        args.execute();
        return Ok(());
    }

    // Load configuration; only a missing file falls back to the example
    if !std::path::Path::new(&cli.config).exists() {
        eprintln!("Warning: {} not found, using the example configuration", cli.config);
    }
    let config = Config::load_or_example(&cli.config)?;

    // Initialize telemetry
    let _telemetry = updown_tracker::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting tracker");
            args.execute(&config).await?;
        }
        Commands::Discover => once::discover(&config).await?,
        Commands::Snapshot(args) => args.execute(&config).await?,
        Commands::Resolve => once::resolve(&config).await?,
        Commands::Status(args) => args.execute(&config).await?,
        Commands::Export(args) => args.execute(&config).await?,
        Commands::Slug(_) => {}
        Commands::Config => {
            println!("Current configuration:");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
