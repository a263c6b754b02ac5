#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use smallvec::smallvec;
use zcrab::Gateway;
use zcrab::config::GatewayConfig;
use zcrab::config::targets;
use zcrab::net::{AssocId, AssociationHandler, Links, NetError};
use zcrab::wire_protocol::{
    Body, Pdu, PresentRequest, PresentResponse, Query, Record, Records, SearchRequest,
    SearchResponse, WireSerializable,
};

pub const LISTENER: AssocId = AssocId(1);

// -----------------------------------------------------------------------------
// ----- FakeLinks -------------------------------------------------------------

/// Records everything the gateway asks of the transport.
#[derive(Default)]
pub struct FakeLinks {
    next: usize,
    listeners: HashMap<AssocId, AssocId>,
    pub connects: Vec<(AssocId, String)>,
    pub sent: Vec<(AssocId, Bytes)>,
    pub destroyed: Vec<AssocId>,
    pub flushing: Vec<AssocId>,
    pub timeouts: HashMap<AssocId, Option<Duration>>,
    pub unreachable: bool,
}

impl FakeLinks {
    fn alloc(&mut self) -> AssocId {
        self.next += 1;
        AssocId(100 + self.next)
    }

    pub fn accept(&mut self, listener: AssocId) -> AssocId {
        let id = self.alloc();
        self.listeners.insert(id, listener);
        id
    }
}

impl Links for FakeLinks {
    fn connect(&mut self, addr: &str) -> Result<AssocId, NetError> {
        if self.unreachable {
            return Err(NetError::Resolve {
                addr: addr.to_owned(),
            });
        }
        let id = self.alloc();
        self.connects.push((id, addr.to_owned()));
        Ok(id)
    }

    fn send(&mut self, id: AssocId, frame: Bytes) {
        self.sent.push((id, frame));
    }

    fn close(&mut self, id: AssocId) {
        self.destroyed.push(id);
    }

    fn destroy(&mut self, id: AssocId) {
        self.destroyed.push(id);
    }

    fn close_after_flush(&mut self, id: AssocId) {
        self.flushing.push(id);
    }

    fn set_idle_timeout(&mut self, id: AssocId, timeout: Option<Duration>) {
        self.timeouts.insert(id, timeout);
    }

    fn listener_of(&self, id: AssocId) -> Option<AssocId> {
        self.listeners.get(&id).copied()
    }
}

// -----------------------------------------------------------------------------
// ----- Harness ---------------------------------------------------------------

pub struct Harness {
    pub gw: Gateway,
    pub links: FakeLinks,
}

impl Harness {
    pub fn new(config: GatewayConfig) -> Self {
        let mut h = Harness {
            gw: Gateway::new(),
            links: FakeLinks::default(),
        };
        h.gw.attach_root(&mut h.links, LISTENER, Arc::new(config));
        h
    }

    pub fn from_toml(raw: &str) -> Self {
        Self::new(targets::parse(raw).expect("test config parses"))
    }

    pub fn client(&mut self) -> AssocId {
        let id = self.links.accept(LISTENER);
        self.gw.on_connected(&mut self.links, id);
        id
    }

    pub fn send(&mut self, from: AssocId, pdu: Pdu) {
        let frame = pdu.to_bytes().expect("test pdu encodes");
        self.gw.on_message(&mut self.links, from, frame);
    }

    pub fn send_raw(&mut self, from: AssocId, raw: &[u8]) {
        self.gw
            .on_message(&mut self.links, from, Bytes::copy_from_slice(raw));
    }

    /// Drain and decode everything queued for `to`.
    pub fn take(&mut self, to: AssocId) -> Vec<Pdu> {
        self.take_raw(to)
            .iter()
            .map(|f| Pdu::from_bytes(f).expect("gateway output decodes"))
            .collect()
    }

    pub fn take_raw(&mut self, to: AssocId) -> Vec<Bytes> {
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.links.sent)
            .into_iter()
            .partition(|(id, _)| *id == to);
        self.links.sent = rest;
        mine.into_iter().map(|(_, f)| f).collect()
    }

    pub fn last_connect(&self) -> AssocId {
        self.links.connects.last().expect("a connect happened").0
    }

    pub fn disconnect(&mut self, id: AssocId) {
        self.gw.on_failed(&mut self.links, id);
    }

    /// A fresh client whose handshake opened and completed a new target
    /// session. Returns `(client, target)`.
    pub fn handshake(&mut self) -> (AssocId, AssocId) {
        let client = self.client();
        self.send(client, Pdu::init_request(None));

        let target = self.last_connect();
        self.gw.on_connected(&mut self.links, target);
        let forwarded = self.take(target);
        assert!(forwarded[0].is_init_request());

        self.send(target, Pdu::init_response(true));
        let answer = self.take(client);
        assert_eq!(answer.len(), 1);
        (client, target)
    }

    /// Run a search through to the target and back with `hits` results.
    pub fn search_with_hits(&mut self, client: AssocId, target: AssocId, req: SearchRequest, hits: i64) {
        self.send(client, Pdu::new(Body::SearchRequest(req)));
        assert_eq!(self.take(target).len(), 1);
        self.send(target, search_response(hits, Records::None));
        assert_eq!(self.take(client).len(), 1);
    }
}

// -----------------------------------------------------------------------------
// ----- Builders --------------------------------------------------------------

pub const ONE_TARGET: &str = r#"
[[targets]]
name = "lib"
default = true
urls = ["lib.example:210"]
"#;

pub fn search(query: &str) -> SearchRequest {
    SearchRequest {
        small_set_upper_bound: 0,
        large_set_lower_bound: 1,
        medium_set_present_number: 0,
        result_set_name: "default".into(),
        databases: smallvec!["Default".to_owned()],
        small_esn: None,
        medium_esn: None,
        preferred_syntax: None,
        query: Query::Rpn(query.into()),
    }
}

pub fn present(set: &str, start: i32, count: i32) -> Pdu {
    Pdu::new(Body::PresentRequest(PresentRequest {
        result_set_id: set.into(),
        start,
        count,
        esn: None,
        syntax: None,
    }))
}

pub fn search_response(hits: i64, records: Records) -> Pdu {
    Pdu::new(Body::SearchResponse(SearchResponse {
        result_count: hits,
        returned: records.len() as i32,
        next_position: 0,
        status: true,
        records,
    }))
}

pub fn present_response(records: Vec<Record>) -> Pdu {
    Pdu::new(Body::PresentResponse(PresentResponse {
        returned: records.len() as i32,
        next_position: 0,
        status: true,
        records: Records::Database(records),
    }))
}

pub fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record {
            database: "Default".into(),
            syntax: None,
            data: Bytes::from(format!("<rec>{i}</rec>")),
        })
        .collect()
}

/// `(code, addinfo)` of a diagnostic carried by a search or present answer.
pub fn diagnostic_of(pdu: &Pdu) -> Option<(u32, Option<String>)> {
    let records = match &pdu.body {
        Body::SearchResponse(r) => &r.records,
        Body::PresentResponse(r) => &r.records,
        _ => return None,
    };
    match records {
        Records::Diagnostic { code, addinfo } => Some((*code, addinfo.clone())),
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// ----- Blocking socket helpers -----------------------------------------------

pub fn write_pdu(stream: &mut TcpStream, pdu: &Pdu) {
    stream.write_all(&pdu.to_bytes().unwrap()).unwrap();
}

pub fn read_pdu(stream: &mut TcpStream) -> Pdu {
    let mut head = [0u8; 5];
    stream.read_exact(&mut head).unwrap();
    let len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize;

    let mut frame = head.to_vec();
    frame.resize(1 + len, 0);
    stream.read_exact(&mut frame[5..]).unwrap();
    Pdu::from_bytes(&frame).unwrap()
}
