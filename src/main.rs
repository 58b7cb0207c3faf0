use clap::Parser;
use slack_export::{Cli, Commands};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Export(args) => slack_export::run_export(&cli.config, args),
        Commands::List => slack_export::run_list(&cli.config),
        Commands::InitConfig { force } => slack_export::run_init_config(&cli.config, *force),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
