use std::sync::Arc;

use crate::config::{GatewayConfig, TargetRecord};
use crate::net::AssocId;
use crate::shared_types::SessionLabel;

use super::pool::Pool;

// -----------------------------------------------------------------------------
// ----- Root ------------------------------------------------------------------

/// A listening front end: owns the back-end pool and the counters every
/// session under it draws from.
#[derive(Debug)]
pub struct Root {
    pub listener: AssocId,
    pub config: Arc<GatewayConfig>,
    pub pool: Pool,
    seed: u64,
    sessions: u64,
    seqno: u64,
}

impl Root {
    pub fn new(listener: AssocId, config: Arc<GatewayConfig>, seed: u64) -> Self {
        Self {
            listener,
            config,
            pool: Pool::new(),
            seed,
            sessions: 0,
            seqno: 0,
        }
    }

    pub fn next_label(&mut self) -> SessionLabel {
        self.sessions += 1;
        SessionLabel::new(self.seed, self.sessions)
    }

    pub fn next_seqno(&mut self) -> u64 {
        let seqno = self.seqno;
        self.seqno += 1;
        seqno
    }

    pub fn ceiling(&self) -> usize {
        self.config.pool_ceiling()
    }

    /// First URL for cookie sessions, otherwise the one with the fewest pool
    /// entries (list order breaks ties).
    pub fn pick_url(&self, target: &TargetRecord, with_cookie: bool) -> Option<String> {
        if with_cookie {
            return target.urls.first().cloned();
        }
        target
            .urls
            .iter()
            .enumerate()
            .min_by_key(|(i, url)| (self.pool.url_load(url), *i))
            .map(|(_, url)| url.clone())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
