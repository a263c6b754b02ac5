use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::{GatewayConfig, Limits, TargetRecord};
use crate::net::AssocId;
use crate::shared_types::SessionLabel;

use super::back::BackId;
use super::sru::SruExchange;
use super::throttle::Throttle;

// -----------------------------------------------------------------------------
// ----- Mode ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Native,
    Rest,
}

// -----------------------------------------------------------------------------
// ----- FrontSession ----------------------------------------------------------

/// One client connection.
#[derive(Debug)]
pub struct FrontSession {
    pub assoc: AssocId,
    pub root: AssocId,
    pub label: SessionLabel,
    /// Snapshot taken when the client connected; reloads do not touch it.
    pub config: Arc<GatewayConfig>,
    pub target: Option<Arc<TargetRecord>>,
    pub cookie: Option<String>,
    pub back: Option<BackId>,
    pub throttle: Throttle,
    /// A message waiting out a throttle delay.
    pub held: Option<Bytes>,
    pub mode: Mode,
    pub sru: Option<SruExchange>,
}

impl FrontSession {
    pub fn new(
        assoc: AssocId,
        root: AssocId,
        label: SessionLabel,
        config: Arc<GatewayConfig>,
        now: Instant,
    ) -> Self {
        let target = config.default_target();
        Self {
            assoc,
            root,
            label,
            config,
            target,
            cookie: None,
            back: None,
            throttle: Throttle::new(now),
            held: None,
            mode: Mode::Native,
            sru: None,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.config.client_timeout_for(self.target.as_deref())
    }

    pub fn limits(&self) -> Limits {
        self.target
            .as_ref()
            .map(|t| t.limit)
            .unwrap_or_default()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
