use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{GatewayConfig, TargetRecord};
use crate::errors::Diagnostic;
use crate::net::AssocId;
use crate::shared_types::SessionLabel;
use crate::wire_protocol::{Body, Pdu};

use super::optimize::{PendingPresent, PendingSearch, ResultSets};

// -----------------------------------------------------------------------------
// ----- BackId ----------------------------------------------------------------

/// Stable pool slot. Survives re-dialling, unlike the association id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackId(pub u64);

/// Where a back-end association lives: the listener owning its pool and its
/// slot there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackRef {
    pub root: AssocId,
    pub id: BackId,
}

// -----------------------------------------------------------------------------
// ----- InFlight --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    pub reference_id: Option<String>,
    pub pending: Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    /// `forward` is false for handshakes the gateway issues itself.
    Init { forward: bool },
    Search(PendingSearch),
    Present(PendingPresent),
    Other,
}

impl InFlight {
    pub fn new(reference_id: Option<String>, pending: Pending) -> Self {
        Self {
            reference_id,
            pending,
        }
    }

    /// What the waiting client gets when the target goes away underneath
    /// this request. Nothing for gateway-issued handshakes.
    pub fn failure_response(&self) -> Option<Pdu> {
        let diag = Diagnostic::temporary_system_error();
        let pdu = match &self.pending {
            Pending::Init { forward: false } => return None,
            Pending::Init { forward: true } => Pdu::init_response(false),
            Pending::Present(p) if p.as_search.is_none() => diag.present_response(),
            _ => diag.search_response(),
        };
        Some(pdu.with_reference_id(self.reference_id.clone()))
    }
}

// -----------------------------------------------------------------------------
// ----- BackSession -----------------------------------------------------------

/// One target-side connection and everything known about the session on it.
#[derive(Debug)]
pub struct BackSession {
    pub assoc: AssocId,
    pub label: SessionLabel,
    pub target: Arc<TargetRecord>,
    pub url: String,
    pub cookie: Option<String>,
    pub front: Option<AssocId>,
    pub seqno: u64,
    pub connected: bool,
    /// Forwarded requests still waiting for an answer, oldest first. The
    /// target answers them in order.
    pub in_flight: VecDeque<InFlight>,
    /// Accepted handshake response, replayed to later handshakes.
    pub init_response: Option<Pdu>,
    pub results: ResultSets,
    pub received_pdus: u64,
    pub received_bytes: u64,
}

// -----------------------------------------------------------------------------
// ----- BackSession: Static ---------------------------------------------------

impl BackSession {
    pub fn new(
        assoc: AssocId,
        label: SessionLabel,
        target: Arc<TargetRecord>,
        url: String,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            assoc,
            label,
            target,
            url,
            cookie: None,
            front: None,
            seqno: 0,
            connected: false,
            in_flight: VecDeque::new(),
            init_response: None,
            results: ResultSets::new(config.record_cache_size),
            received_pdus: 0,
            received_bytes: 0,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BackSession: Public ---------------------------------------------------

impl BackSession {
    pub fn is_waiting(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Unbound and not waiting.
    pub fn is_idle(&self) -> bool {
        self.front.is_none() && !self.is_waiting()
    }

    /// Point the slot at a fresh connection, dropping all session state.
    pub fn redial(&mut self, assoc: AssocId, target: Arc<TargetRecord>, url: String) {
        self.assoc = assoc;
        self.target = target;
        self.url = url;
        self.connected = false;
        self.in_flight.clear();
        self.init_response = None;
        self.results.reset();
        self.received_pdus = 0;
        self.received_bytes = 0;
    }

    /// Failure answers for every request still waiting on this session.
    pub fn failure_responses(&self) -> Vec<Pdu> {
        self.in_flight
            .iter()
            .filter_map(InFlight::failure_response)
            .map(|pdu| self.stamp(pdu))
            .collect()
    }

    /// Stamp the back's cookie on everything sent to its client.
    pub fn stamp(&self, pdu: Pdu) -> Pdu {
        match &self.cookie {
            Some(cookie) => pdu.with_cookie(Some(cookie.clone())),
            None => pdu,
        }
    }

    /// The cached handshake response for a new client handshake.
    pub fn replay_init(&self, reference_id: Option<String>) -> Option<Pdu> {
        let cached = self.init_response.clone()?;
        Some(
            self.stamp(Pdu::new(cached.body))
                .with_reference_id(reference_id),
        )
    }

    pub fn keep_alive(&self) -> bool {
        !self.is_waiting()
            && self.init_response.is_some()
            && self
                .target
                .keepalive
                .allows(self.received_bytes, self.received_pdus)
    }

    /// Records an accepted handshake response for replay.
    pub fn remember_init(&mut self, pdu: &Pdu) {
        if let Body::InitResponse(res) = &pdu.body {
            if res.accepted {
                self.init_response = Some(Pdu::new(pdu.body.clone()));
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn back() -> BackSession {
        BackSession::new(
            AssocId(3),
            SessionLabel::new(1, 1),
            Arc::new(TargetRecord::literal("localhost:210")),
            "localhost:210".into(),
            &GatewayConfig::default(),
        )
    }

    #[test]
    fn replays_handshake_with_cookie_and_reference() {
        let mut b = back();
        b.cookie = Some("c-1".into());
        assert!(b.replay_init(None).is_none());

        b.remember_init(&Pdu::init_response(true).with_reference_id(Some("orig".into())));
        let replay = b.replay_init(Some("ref-2".into())).unwrap();

        assert_eq!(replay.header.cookie.as_deref(), Some("c-1"));
        assert_eq!(replay.header.reference_id.as_deref(), Some("ref-2"));
        assert_eq!(replay.body, Pdu::init_response(true).body);
    }

    #[test]
    fn rejected_handshakes_are_not_cached() {
        let mut b = back();
        b.remember_init(&Pdu::init_response(false));
        assert!(b.init_response.is_none());
        assert!(!b.keep_alive());
    }

    #[test]
    fn keep_alive_needs_quiet_and_light_use() {
        let mut b = back();
        b.remember_init(&Pdu::init_response(true));
        assert!(b.keep_alive());

        b.received_pdus = 1000;
        assert!(!b.keep_alive());

        b.received_pdus = 0;
        b.in_flight.push_back(InFlight::new(None, Pending::Other));
        assert!(!b.keep_alive());
    }

    #[test]
    fn every_waiting_request_gets_a_failure_answer() {
        let mut b = back();
        b.cookie = Some("c-1".into());
        b.in_flight
            .push_back(InFlight::new(None, Pending::Init { forward: false }));
        b.in_flight
            .push_back(InFlight::new(Some("a".into()), Pending::Other));
        b.in_flight
            .push_back(InFlight::new(Some("b".into()), Pending::Other));

        let answers = b.failure_responses();
        let refs: Vec<_> = answers
            .iter()
            .map(|p| p.header.reference_id.as_deref())
            .collect();
        assert_eq!(refs, vec![Some("a"), Some("b")]);
        assert!(answers.iter().all(|p| p.header.cookie.as_deref() == Some("c-1")));

        let (target, url) = (b.target.clone(), b.url.clone());
        b.redial(AssocId(9), target, url);
        assert!(!b.is_waiting());
    }

    #[test]
    fn failure_responses_follow_the_request() {
        let init = InFlight::new(Some("r".into()), Pending::Init { forward: true });
        let res = init.failure_response().unwrap();
        assert_eq!(res.body, Pdu::init_response(false).body);
        assert_eq!(res.header.reference_id.as_deref(), Some("r"));

        assert!(InFlight::new(None, Pending::Init { forward: false })
            .failure_response()
            .is_none());

        let other = InFlight::new(None, Pending::Other).failure_response().unwrap();
        assert!(matches!(other.body, Body::SearchResponse(_)));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
