use std::env;

use chrono::Duration;
use gateway_client::GatewayConfig;
use log::*;
use recon_engine::{config::ReconConfig, db_url};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub recon: ReconConfig,
}

impl RunnerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = db_url();
        let gateway = GatewayConfig::new_from_env_or_default();
        let recon = recon_config_from_env();
        Self { database_url, gateway, recon }
    }
}

fn recon_config_from_env() -> ReconConfig {
    let mut config = ReconConfig::default();
    if let Ok(s) = env::var("TPR_COLLISION_WINDOW_MINUTES") {
        match s.parse::<i64>() {
            Ok(minutes) => config.collision_window = Duration::minutes(minutes),
            Err(e) => warn!("🪛️ Invalid value for TPR_COLLISION_WINDOW_MINUTES ({s}). {e}. Using the default."),
        }
    }
    if let Ok(s) = env::var("TPR_PAYMENT_CUTOFF_HOURS") {
        match s.parse::<i64>() {
            Ok(hours) => config.unconfirmed_cutoff = Duration::hours(hours),
            Err(e) => warn!("🪛️ Invalid value for TPR_PAYMENT_CUTOFF_HOURS ({s}). {e}. Using the default."),
        }
    }
    if let Ok(s) = env::var("TPR_SETTLE_DELAY_MS") {
        match s.parse::<u64>() {
            Ok(ms) => config.settle_delay = std::time::Duration::from_millis(ms),
            Err(e) => warn!("🪛️ Invalid value for TPR_SETTLE_DELAY_MS ({s}). {e}. Using the default."),
        }
    }
    if let Ok(s) = env::var("TPR_MAX_PAGES") {
        match s.parse::<u32>() {
            Ok(pages) => config.max_pages = pages,
            Err(e) => warn!("🪛️ Invalid value for TPR_MAX_PAGES ({s}). {e}. Using the default."),
        }
    }
    if let Ok(url) = env::var("TPR_CHECKOUT_SUCCESS_URL") {
        config.checkout_success_url = url;
    }
    if let Ok(url) = env::var("TPR_CHECKOUT_CANCEL_URL") {
        config.checkout_cancel_url = url;
    }
    config
}
