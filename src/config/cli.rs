use clap::Parser;
use parking_lot::RwLock;
use secrecy::SecretString;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use super::targets::GatewayConfig;
use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
    pub overrides: Overrides,
}

/// Command-line settings that take precedence over the targets file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub default_target: Option<String>,
    pub max_clients: Option<usize>,
    pub client_timeout: Option<Duration>,
    pub target_timeout: Option<Duration>,
    pub optimize: Option<bool>,
    pub proxy_auth: Option<SecretString>,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

impl Overrides {
    pub fn apply(&self, mut cfg: GatewayConfig) -> GatewayConfig {
        if let Some(target) = &self.default_target {
            cfg.default_target = Some(target.clone());
        }
        if let Some(n) = self.max_clients {
            cfg.max_clients = n.max(1);
        }
        if let Some(t) = self.client_timeout {
            cfg.client_timeout = t;
        }
        if let Some(t) = self.target_timeout {
            cfg.target_timeout = t;
        }
        if let Some(optimize) = self.optimize {
            cfg.optimize = optimize;
        }
        if let Some(auth) = &self.proxy_auth {
            cfg.proxy_auth = Some(auth.clone());
        }
        cfg
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));

        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
            overrides: Overrides {
                default_target: args.target,
                max_clients: args.max_clients,
                client_timeout: args.client_timeout,
                target_timeout: args.target_timeout,
                optimize: args.optimize,
                proxy_auth: args
                    .proxy_auth
                    .map(|p| SecretString::new(p.into_boxed_str())),
            },
        }
    }

    fn validate(&self) {
        if let Some(path) = &self.config_file_location {
            must_exist_file(path, "--config / zcrab.toml");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "zcrab", version, about = "Z39.50 / SRU gateway")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1). Required via CLI or ENV.
    #[arg(long = "host", short = 'H', env = "ZCRAB_HOST")]
    host: IpAddr,

    // Required via CLI or ENV.
    #[arg(long = "port", short = 'p', env = "ZCRAB_PORT")]
    port: u16,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,

    // Optional; must exist when given.
    #[arg(long = "config", env = "ZCRAB_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    // Target name from the config file, or a literal host:port.
    #[arg(long = "target", short = 't', env = "ZCRAB_TARGET")]
    target: Option<String>,

    #[arg(long = "max-clients", short = 'm', env = "ZCRAB_MAX_CLIENTS")]
    max_clients: Option<usize>,

    #[arg(long = "client-timeout", short = 'i', env = "ZCRAB_CLIENT_TIMEOUT", value_parser = humantime::parse_duration)]
    client_timeout: Option<Duration>,

    #[arg(long = "target-timeout", short = 'T', env = "ZCRAB_TARGET_TIMEOUT", value_parser = humantime::parse_duration)]
    target_timeout: Option<Duration>,

    #[arg(long = "optimize", short = 'o', env = "ZCRAB_OPTIMIZE")]
    optimize: Option<bool>,

    // user/password injected into handshakes that carry none.
    #[arg(long = "proxy-auth", short = 'U', env = "ZCRAB_PROXY_AUTH")]
    proxy_auth: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = Args::try_parse_from([
            "zcrab", "-H", "127.0.0.1", "-p", "9000", "-t", "loc", "-m", "4", "-i", "2m", "-o",
            "false",
        ])
        .unwrap();

        assert_eq!(args.port, 9000);
        assert_eq!(args.target.as_deref(), Some("loc"));
        assert_eq!(args.max_clients, Some(4));
        assert_eq!(args.client_timeout, Some(Duration::from_secs(120)));
        assert_eq!(args.optimize, Some(false));
        assert!(args.config_file.is_none());
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = Overrides {
            default_target: Some("other:210".into()),
            max_clients: Some(3),
            optimize: Some(false),
            ..Default::default()
        };

        let cfg = overrides.apply(GatewayConfig::default());
        assert_eq!(cfg.max_clients, 3);
        assert!(!cfg.optimize);
        assert_eq!(cfg.default_target().unwrap().urls, vec!["other:210"]);
        assert_eq!(cfg.client_timeout, Duration::from_secs(600));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
