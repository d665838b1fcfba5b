use std::sync::Arc;

use clap::Parser;
use log::info;

use cli::{Cli, Command};
use config::Config;
use engine::Engine;
use logging::LoggingSettings;
use notify::{EmailService, Notifier, NtfyClient, WebPushNotifier};
use store::{MediaStore, PgMediaStore, postgres};

mod adapters;
mod cache;
mod cli;
mod config;
mod domain;
mod engine;
mod error;
mod http_api;
mod image_cache;
mod logging;
mod notify;
mod scheduler;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    logging::setup_logging(LoggingSettings { root_level: args.log_level, other_levels: Vec::new() })?;

    let config = Config::load(&args.config).await?;

    let pool = postgres::create_pool(&config.database_url).await?;
    postgres::run_migrations(&pool).await?;
    let store: Arc<dyn MediaStore> = Arc::new(PgMediaStore::new(pool));

    let notifier = build_notifier(&config)?;
    let command = args.command;

    let engine = Arc::new(Engine::new(config, store, notifier).await?);

    match command {
        Command::Serve => serve(engine).await,
        Command::RunCleanup { dry_run } => run_cleanup(engine, dry_run).await,
    }
}

async fn serve(engine: Arc<Engine>) -> anyhow::Result<()> {
    let listen_addr = engine.config.listen_addr.clone();
    engine.start_scheduler().await?;

    let app = http_api::router(engine);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("listening on {listen_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_cleanup(engine: Arc<Engine>, dry_run: Option<bool>) -> anyhow::Result<()> {
    let dry_run = dry_run.unwrap_or(engine.config.dry_run);
    let outcome = engine.run_cleanup_once(dry_run).await?;
    info!(
        "cleanup complete: {} marked, {} deleted, {} rescinded",
        outcome.marked, outcome.deleted, outcome.rescinded
    );
    Ok(())
}

fn build_notifier(config: &Config) -> anyhow::Result<Notifier> {
    let email = config.smtp.as_ref().map(EmailService::new).transpose()?;
    let ntfy = config.ntfy.as_ref().map(NtfyClient::new);
    let webpush = config.webpush.as_ref().map(WebPushNotifier::new).transpose()?;
    Ok(Notifier { email, ntfy, webpush })
}
