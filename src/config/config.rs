use parking_lot::RwLock;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use super::{cli::CliConfig, targets::GatewayConfig, targets::TargetsConfig, types::LogLevel};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    /// Targets file with command-line overrides applied.
    pub gateway: Arc<GatewayConfig>,
    /// Bumped on every reload; the event loop compares it at its checkpoint.
    pub generation: u64,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because TargetsConfig::init() is async (non-blocking IO).
    pub async fn init() {
        CliConfig::init();
        let cli = CliConfig::snapshot();
        TargetsConfig::init(cli.config_file_location.as_deref()).await;

        Self::load();
    }

    /// Re-reads the targets file. A broken file keeps the running config and
    /// leaves the generation untouched.
    pub async fn reload() {
        let cli = CliConfig::snapshot();
        let Some(path) = cli.config_file_location else {
            return;
        };

        if TargetsConfig::reload(&path).await {
            Self::load();
        }
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }

    pub fn generation() -> u64 {
        Self::handle().read().generation
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn load() {
        let cli = CliConfig::snapshot();
        let gateway = cli.overrides.apply((*TargetsConfig::snapshot()).clone());

        let next = |generation| Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            gateway: Arc::new(gateway),
            generation,
        };

        if let Some(handle) = ROOT_CONFIG.get() {
            let mut guard = handle.write();
            let generation = guard.generation + 1;
            *guard = next(generation);
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next(0))));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
