use clap::Parser;
use dotenvy::dotenv;
use gateway_client::GatewayClient;
use log::info;
use recon_engine::{JobKind, Reconciler, SqliteStore};

mod cli;
mod config;

use cli::Cli;
use config::RunnerConfig;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();
    let Ok(kind) = cli.job.parse::<JobKind>() else {
        eprintln!("Job id not recognised: '{}'. Valid values = ['payments', 'orders', 'retry']", cli.job);
        return;
    };
    let config = RunnerConfig::from_env_or_default();
    match run(kind, config).await {
        Ok(()) => info!("🔄️ {kind} job completed"),
        Err(e) => eprintln!("{e}"),
    }
}

async fn run(kind: JobKind, config: RunnerConfig) -> anyhow::Result<()> {
    let store = SqliteStore::new_with_url(&config.database_url, 5).await?;
    store.run_migrations().await?;
    let gateway = GatewayClient::new(config.gateway.clone())?;
    let reconciler = Reconciler::new(store, gateway, config.recon.clone());
    reconciler.run(kind).await?;
    Ok(())
}
