mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use makhraj_cache::HostCapability;
use makhraj_cache::config::loader::load_config;
use output::print_error;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    makhraj_cache::init_tracing();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Configuration error: {e}"));
            std::process::exit(2);
        }
    };
    makhraj_cache::apply_logging_level(&config.logging.level);

    if let Err(e) = run(cli, config).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: makhraj_cache::AppConfig) -> Result<()> {
    let format = cli.format.unwrap_or_default();
    let capability = if cli.client {
        HostCapability::Client
    } else {
        HostCapability::Server
    };
    tracing::debug!(?capability, "opening cache");
    let cache = makhraj_cache::connect(&config, capability).await;

    let result = match &cli.command {
        Commands::Get(args) => commands::cache::get(&cache, &args.key, format).await,
        Commands::Set(args) => commands::cache::set(&cache, args).await,
        Commands::Delete(args) => commands::cache::delete(&cache, &args.key).await,
        Commands::Clear(args) => commands::cache::clear(&cache, args.prefix.as_deref()).await,
        Commands::Stats => commands::status::stats(&cache, format).await,
        Commands::Ping => commands::status::ping(&cache).await,
    };

    cache.shutdown();
    result
}
