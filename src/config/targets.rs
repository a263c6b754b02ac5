use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{
    collections::HashSet,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::fs;
use tracing::error;

use super::rules::{AttributeRule, RuleError, SyntaxMatch, SyntaxRule, ValueSet};
use super::types::{DurationError, KeepAlive, Limits, parse_duration, parse_opt_duration};

// -----------------------------------------------------------------------------
// ----- Singleton -------------------------------------------------------------

static TARGETS: OnceCell<TargetsConfig> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- TargetsConfig ---------------------------------------------------------

/// The gateway settings and target table as read from disk, before any
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct TargetsConfig {
    inner: Arc<RwLock<Arc<GatewayConfig>>>,
}

// -----------------------------------------------------------------------------
// ----- TargetsConfig: Static -------------------------------------------------

impl TargetsConfig {
    /// Without a file the gateway runs on defaults plus whatever the command
    /// line provides.
    pub async fn init(path: Option<&Path>) {
        let cfg = match path {
            Some(path) => Self::from_file_async(path)
                .await
                .unwrap_or_else(|e| panic!("failed to load targets config from {:?}: {e}", path)),
            None => GatewayConfig::default(),
        };

        TARGETS
            .set(TargetsConfig {
                inner: Arc::new(RwLock::new(Arc::new(cfg))),
            })
            .unwrap_or_else(|_| panic!("TargetsConfig::init called twice"));
    }

    /// Returns whether the new file was installed.
    pub async fn reload(path: &Path) -> bool {
        let next = match Self::from_file_async(path).await {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(
                    "reload failed; keeping previous targets config. path={:?} error={}",
                    path, e
                );
                return false;
            }
        };

        *Self::handle().inner.write() = Arc::new(next);
        true
    }

    pub fn handle() -> &'static TargetsConfig {
        TARGETS.get().expect("Targets not initialized")
    }

    pub fn snapshot() -> Arc<GatewayConfig> {
        Self::handle().inner.read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- TargetsConfig: Private ------------------------------------------------

impl TargetsConfig {
    async fn from_file_async(path: &Path) -> Result<GatewayConfig, TargetsError> {
        let raw = fs::read_to_string(path).await.map_err(|e| TargetsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        parse(&raw)
    }
}

/// Parses a targets file.
pub fn parse(raw: &str) -> Result<GatewayConfig, TargetsError> {
    let doc: TargetsFile = toml::from_str(raw).map_err(|e| TargetsError::Toml { source: e })?;

    let mut cfg = GatewayConfig::default();
    doc.gateway.apply(&mut cfg)?;

    let mut seen = HashSet::with_capacity(doc.targets.len());
    for entry in doc.targets {
        if !seen.insert(entry.name.clone()) {
            return Err(TargetsError::DuplicateTarget { name: entry.name });
        }
        cfg.targets.push(Arc::new(entry.into_record()?));
    }

    Ok(cfg)
}

// -----------------------------------------------------------------------------
// ----- GatewayConfig ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Pool ceiling when the default target does not set its own.
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub target_timeout: Duration,
    pub connect_timeout: Duration,
    pub optimize: bool,
    pub prewarm_interval: Duration,
    pub record_cache_size: NonZeroUsize,
    pub proxy_auth: Option<SecretString>,
    /// Name or literal address of the target used when a client names none.
    pub default_target: Option<String>,
    pub targets: Vec<Arc<TargetRecord>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_clients: 50,
            client_timeout: Duration::from_secs(600),
            target_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(20),
            optimize: true,
            prewarm_interval: Duration::from_secs(30),
            record_cache_size: NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN),
            proxy_auth: None,
            default_target: None,
            targets: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn target(&self, name: &str) -> Option<Arc<TargetRecord>> {
        self.targets.iter().find(|t| t.name == name).cloned()
    }

    /// Resolves a client's proxy hint, or the default target without one.
    /// Unknown names are used as literal addresses.
    pub fn resolve(&self, hint: Option<&str>) -> Option<Arc<TargetRecord>> {
        match hint {
            Some(name) => Some(
                self.target(name)
                    .unwrap_or_else(|| Arc::new(TargetRecord::literal(name))),
            ),
            None => self.default_target(),
        }
    }

    pub fn default_target(&self) -> Option<Arc<TargetRecord>> {
        if let Some(name) = &self.default_target {
            return self.resolve(Some(name));
        }
        self.targets.iter().find(|t| t.default).cloned()
    }

    /// The root's pool ceiling.
    pub fn pool_ceiling(&self) -> usize {
        self.default_target()
            .and_then(|t| t.max_clients)
            .unwrap_or(self.max_clients)
            .max(1)
    }

    pub fn client_timeout_for(&self, target: Option<&TargetRecord>) -> Duration {
        target
            .and_then(|t| t.client_timeout)
            .unwrap_or(self.client_timeout)
    }

    pub fn target_timeout_for(&self, target: &TargetRecord) -> Duration {
        target.target_timeout.unwrap_or(self.target_timeout)
    }

    pub fn proxy_auth_exposed(&self) -> Option<&str> {
        self.proxy_auth.as_ref().map(|s| s.expose_secret())
    }
}

// -----------------------------------------------------------------------------
// ----- TargetRecord ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub name: String,
    pub urls: Vec<String>,
    pub default: bool,
    /// Idle connections to keep open per URL.
    pub preinit: usize,
    pub limit: Limits,
    pub keepalive: KeepAlive,
    pub client_timeout: Option<Duration>,
    pub target_timeout: Option<Duration>,
    pub max_clients: Option<usize>,
    pub explain: Option<String>,
    pub attributes: Vec<AttributeRule>,
    pub syntaxes: Vec<SyntaxRule>,
}

impl TargetRecord {
    /// A target known only by address.
    pub fn literal(addr: &str) -> Self {
        Self {
            name: addr.to_owned(),
            urls: vec![addr.to_owned()],
            default: false,
            preinit: 0,
            limit: Limits::default(),
            keepalive: KeepAlive::default(),
            client_timeout: None,
            target_timeout: None,
            max_clients: None,
            explain: None,
            attributes: Vec::new(),
            syntaxes: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct TargetsFile {
    #[serde(default)]
    gateway: GatewaySection,
    #[serde(default)]
    targets: Vec<TargetFileEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GatewaySection {
    max_clients: Option<usize>,
    client_timeout: Option<String>,
    target_timeout: Option<String>,
    connect_timeout: Option<String>,
    optimize: Option<bool>,
    prewarm_interval: Option<String>,
    record_cache_size: Option<usize>,
    proxy_auth: Option<String>,
    default_target: Option<String>,
}

impl GatewaySection {
    fn apply(self, cfg: &mut GatewayConfig) -> Result<(), TargetsError> {
        if let Some(n) = self.max_clients {
            if n == 0 {
                return Err(TargetsError::ZeroMaxClients {
                    scope: "[gateway]".into(),
                });
            }
            cfg.max_clients = n;
        }
        if let Some(raw) = self.client_timeout {
            cfg.client_timeout = parse_duration("client_timeout", &raw)?;
        }
        if let Some(raw) = self.target_timeout {
            cfg.target_timeout = parse_duration("target_timeout", &raw)?;
        }
        if let Some(raw) = self.connect_timeout {
            cfg.connect_timeout = parse_duration("connect_timeout", &raw)?;
        }
        if let Some(raw) = self.prewarm_interval {
            cfg.prewarm_interval = parse_duration("prewarm_interval", &raw)?;
        }
        if let Some(optimize) = self.optimize {
            cfg.optimize = optimize;
        }
        if let Some(size) = self.record_cache_size {
            cfg.record_cache_size = NonZeroUsize::new(size).ok_or(TargetsError::ZeroCacheSize)?;
        }
        cfg.proxy_auth = self
            .proxy_auth
            .map(|p| SecretString::new(p.into_boxed_str()));
        cfg.default_target = self.default_target;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TargetFileEntry {
    name: String,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    preinit: usize,
    #[serde(default)]
    limit: LimitEntry,
    #[serde(default)]
    keepalive: KeepAliveEntry,
    client_timeout: Option<String>,
    target_timeout: Option<String>,
    max_clients: Option<usize>,
    explain: Option<String>,
    #[serde(default)]
    attributes: Vec<AttributeEntry>,
    #[serde(default)]
    syntaxes: Vec<SyntaxEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitEntry {
    #[serde(default)]
    bandwidth: u64,
    #[serde(default)]
    pdu: u64,
    #[serde(default)]
    retrieve: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KeepAliveEntry {
    bandwidth: Option<u64>,
    pdu: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AttributeEntry {
    #[serde(rename = "type")]
    attr_type: String,
    value: String,
    #[serde(default)]
    error: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct SyntaxEntry {
    #[serde(rename = "type")]
    syntax: String,
    #[serde(default)]
    error: u32,
    identifier: Option<String>,
    #[serde(default)]
    names: Vec<String>,
}

impl TargetFileEntry {
    fn into_record(self) -> Result<TargetRecord, TargetsError> {
        if self.urls.is_empty() {
            return Err(TargetsError::NoUrls { name: self.name });
        }
        if self.max_clients == Some(0) {
            return Err(TargetsError::ZeroMaxClients {
                scope: format!("target '{}'", self.name),
            });
        }

        let name = self.name;
        let bad_rule = |source| TargetsError::BadRule {
            target: name.clone(),
            source,
        };

        let attributes = self
            .attributes
            .iter()
            .map(|a| -> Result<AttributeRule, RuleError> {
                Ok(AttributeRule {
                    attr_type: ValueSet::parse(&a.attr_type)?,
                    value: ValueSet::parse(&a.value)?,
                    error: a.error,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(bad_rule)?;

        let syntaxes = self
            .syntaxes
            .into_iter()
            .map(|s| SyntaxRule {
                syntax: SyntaxMatch::parse(&s.syntax),
                error: s.error,
                identifier: s.identifier,
                names: s.names,
            })
            .collect();

        let defaults = KeepAlive::default();

        Ok(TargetRecord {
            urls: self.urls,
            default: self.default,
            preinit: self.preinit,
            limit: Limits {
                bandwidth: self.limit.bandwidth,
                pdu: self.limit.pdu,
                retrieve: self.limit.retrieve,
            },
            keepalive: KeepAlive {
                bandwidth: self.keepalive.bandwidth.unwrap_or(defaults.bandwidth),
                pdu: self.keepalive.pdu.unwrap_or(defaults.pdu),
            },
            client_timeout: parse_opt_duration("client_timeout", self.client_timeout.as_deref())?,
            target_timeout: parse_opt_duration("target_timeout", self.target_timeout.as_deref())?,
            max_clients: self.max_clients,
            explain: self.explain,
            attributes,
            syntaxes,
            name,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("duplicate [[targets]] entry for target '{name}'")]
    DuplicateTarget { name: String },

    #[error("target '{name}' has no urls")]
    NoUrls { name: String },

    #[error("max_clients must be at least 1 in {scope}")]
    ZeroMaxClients { scope: String },

    #[error("record_cache_size must be at least 1")]
    ZeroCacheSize,

    #[error("target '{target}': {source}")]
    BadRule { target: String, source: RuleError },

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error("read error for {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
