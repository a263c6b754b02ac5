//! The gateway proper: pairs client sessions with pooled target sessions
//! and decides, message by message, whether a request goes to the target or
//! is answered on the spot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{Span, debug, info, info_span, warn};

use crate::config::rules::{check_query, check_syntax};
use crate::config::{GatewayConfig, TargetRecord};
use crate::errors::Diagnostic;
use crate::net::{AssocId, AssociationHandler, Links};
use crate::shared_types::SessionLabel;
use crate::wire_protocol::frame::{FrameKind, kind_of};
use crate::wire_protocol::{
    Body, HttpRequest, HttpResponse, HttpVersion, Pdu, WireSerializable,
};

use super::back::{BackId, BackRef, BackSession, InFlight, Pending};
use super::error::GatewayError;
use super::front::{FrontSession, Mode};
use super::optimize::{PresentPlan, SearchPlan, present_as_search};
use super::prewarm::prewarm;
use super::root::Root;
use super::sru::{self, SruAction, SruStep};
use super::transform::{CqlPassthrough, QueryTransform};

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

pub struct Gateway {
    roots: HashMap<AssocId, Root>,
    fronts: HashMap<AssocId, FrontSession>,
    backs: HashMap<AssocId, BackRef>,
    transform: Box<dyn QueryTransform>,
    seed: u64,
}

enum Route {
    Back(BackId),
    /// Answer the request with this diagnostic, keep the session.
    Refuse(Diagnostic),
    /// End the session.
    Violation(&'static str),
}

enum Outcome {
    Reply(Pdu),
    Forward(Pdu, InFlight),
}

// -----------------------------------------------------------------------------
// ----- Gateway: Static -------------------------------------------------------

impl Gateway {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            roots: HashMap::new(),
            fronts: HashMap::new(),
            backs: HashMap::new(),
            transform: Box::new(CqlPassthrough),
            seed,
        }
    }

    pub fn with_transform(mut self, transform: impl QueryTransform + 'static) -> Self {
        self.transform = Box::new(transform);
        self
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Public -------------------------------------------------------

impl Gateway {
    /// Serve clients accepted on `listener`. The listener's own timeout
    /// drives periodic pre-warming.
    pub fn attach_root(
        &mut self,
        links: &mut dyn Links,
        listener: AssocId,
        config: Arc<GatewayConfig>,
    ) {
        links.set_idle_timeout(listener, Some(config.prewarm_interval));
        let seed = self.seed;
        let root = self
            .roots
            .entry(listener)
            .or_insert_with(|| Root::new(listener, config.clone(), seed));
        root.config = config;

        prewarm(root, &mut self.backs, links);
    }

    /// New clients get `config`; sessions already running keep theirs.
    pub fn reconfigure(&mut self, links: &mut dyn Links, config: Arc<GatewayConfig>) {
        for root in self.roots.values_mut() {
            links.set_idle_timeout(root.listener, Some(config.prewarm_interval));
            root.config = config.clone();
            prewarm(root, &mut self.backs, links);
        }
        info!("configuration reloaded; {} targets", config.targets.len());
    }

    pub fn pool_size(&self, listener: AssocId) -> usize {
        self.roots.get(&listener).map_or(0, |r| r.pool.len())
    }

    pub fn client_count(&self) -> usize {
        self.fronts.len()
    }

    pub fn is_client(&self, id: AssocId) -> bool {
        self.fronts.contains_key(&id)
    }

    /// The target association currently serving a client.
    pub fn bound_target(&self, client: AssocId) -> Option<AssocId> {
        let front = self.fronts.get(&client)?;
        let back = self.roots.get(&front.root)?.pool.get(front.back?)?;
        Some(back.assoc)
    }

    /// Target associations in `listener`'s pool with no client attached.
    pub fn unbound_targets(&self, listener: AssocId) -> Vec<AssocId> {
        let Some(root) = self.roots.get(&listener) else {
            return Vec::new();
        };
        let mut out: Vec<_> = root
            .pool
            .iter()
            .filter(|(_, b)| b.front.is_none())
            .map(|(_, b)| b.assoc)
            .collect();
        out.sort();
        out
    }
}

// -----------------------------------------------------------------------------
// ----- AssociationHandler ----------------------------------------------------

impl AssociationHandler for Gateway {
    fn on_connected(&mut self, links: &mut dyn Links, id: AssocId) {
        if let Some(back) = self.backs.get(&id).copied() {
            self.target_connected(links, back);
            return;
        }

        let Some(listener) = links.listener_of(id) else {
            return;
        };
        let Some(root) = self.roots.get_mut(&listener) else {
            debug!("connection {} on unknown listener {}", id.0, listener.0);
            return;
        };

        let label = root.next_label();
        let front = FrontSession::new(id, listener, label, root.config.clone(), Instant::now());

        let span = session_span(&front.label);
        let _enter = span.enter();
        info!("client connected");

        links.set_idle_timeout(id, Some(front.idle_timeout()));
        self.fronts.insert(id, front);
    }

    fn on_message(&mut self, links: &mut dyn Links, id: AssocId, frame: Bytes) {
        if self.fronts.contains_key(&id) {
            self.client_frame(links, id, frame);
        } else if self.backs.contains_key(&id) {
            self.target_frame(links, id, frame);
        }
    }

    fn on_failed(&mut self, links: &mut dyn Links, id: AssocId) {
        if self.fronts.contains_key(&id) {
            self.teardown_client(links, id);
        } else if self.backs.contains_key(&id) {
            self.target_lost(links, id);
        } else if self.roots.remove(&id).is_some() {
            warn!("listener {} failed", id.0);
        }
    }

    fn on_timed_out(&mut self, links: &mut dyn Links, id: AssocId) {
        if let Some(root) = self.roots.get_mut(&id) {
            prewarm(root, &mut self.backs, links);
            return;
        }

        if let Some(front) = self.fronts.get_mut(&id) {
            let span = session_span(&front.label);
            let _enter = span.enter();

            match front.held.take() {
                Some(frame) => {
                    debug!("releasing throttled message");
                    links.set_idle_timeout(id, Some(front.idle_timeout()));
                    self.process_frame(links, id, frame);
                }
                None => {
                    info!("client idle; closing");
                    self.teardown_client(links, id);
                }
            }
            return;
        }

        if self.backs.contains_key(&id) {
            self.target_lost(links, id);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Client side -----------------------------------------------------------

impl Gateway {
    fn client_frame(&mut self, links: &mut dyn Links, id: AssocId, frame: Bytes) {
        let Some(front) = self.fronts.get_mut(&id) else {
            return;
        };
        let span = session_span(&front.label);
        let _enter = span.enter();

        if front.held.is_some() {
            warn!("message arrived while another is throttled; closing");
            self.teardown_client(links, id);
            return;
        }

        let limits = front.limits();
        if let Some(delay) = front.throttle.record(Instant::now(), frame.len(), &limits) {
            debug!("throttling client for {delay:?}");
            front.held = Some(frame);
            links.set_idle_timeout(id, Some(delay));
            return;
        }

        self.process_frame(links, id, frame);
    }

    fn process_frame(&mut self, links: &mut dyn Links, id: AssocId, frame: Bytes) {
        match kind_of(&frame) {
            FrameKind::Http => self.http_request(links, id, &frame),
            FrameKind::Native => match Pdu::from_bytes(&frame) {
                Ok(pdu) => self.client_request(links, id, pdu),
                Err(e) => {
                    warn!("undecodable client message: {e}");
                    self.teardown_client(links, id);
                }
            },
        }
    }

    fn http_request(&mut self, links: &mut dyn Links, id: AssocId, frame: &[u8]) {
        let Some(front) = self.fronts.get_mut(&id) else {
            return;
        };
        front.mode = Mode::Rest;

        let req = match HttpRequest::parse(frame) {
            Ok(req) => req,
            Err(e) => {
                warn!("bad http request: {e}");
                http_reply(links, id, sru::bad_request(), HttpVersion::Http10, false);
                return;
            }
        };

        if front.sru.is_some() {
            warn!("pipelined http request; closing");
            self.teardown_client(links, id);
            return;
        }

        debug!("{} {}", req.method, req.path);
        match sru::interpret(&req, front.target.as_deref(), self.transform.as_ref()) {
            SruAction::Respond(res) => http_reply(links, id, res, req.version, req.keep_alive()),
            SruAction::Search(exchange) => {
                let init = exchange.init_pdu();
                front.sru = Some(exchange);
                self.client_request(links, id, init);
            }
        }
    }

    fn client_request(&mut self, links: &mut dyn Links, id: AssocId, pdu: Pdu) {
        debug!("received {}", pdu.name());

        let bid = match self.route(links, id, &pdu) {
            Route::Back(bid) => bid,
            Route::Refuse(diag) => {
                debug!("refusing {}: diagnostic {}", pdu.name(), diag.code);
                self.deliver(links, id, diag.response_to(&pdu));
                return;
            }
            Route::Violation(why) => {
                warn!("protocol violation: {why}");
                self.teardown_client(links, id);
                return;
            }
        };

        let Some(front) = self.fronts.get(&id) else {
            return;
        };
        let config = front.config.clone();
        let Some(back) = self
            .roots
            .get_mut(&front.root)
            .and_then(|r| r.pool.get_mut(bid))
        else {
            return;
        };

        match plan(back, pdu, &config) {
            Outcome::Reply(reply) => {
                let reply = back.stamp(reply);
                self.deliver(links, id, reply);
            }
            Outcome::Forward(request, in_flight) => {
                if back.is_waiting() {
                    debug!("pipelining behind {} earlier requests", back.in_flight.len());
                }
                match send_pdu(links, back.assoc, &request) {
                    Ok(()) => {
                        debug!("forwarded {} to {}", request.name(), back.url);
                        back.in_flight.push_back(in_flight);
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    /// Find or make the target session for a client's message.
    fn route(&mut self, links: &mut dyn Links, id: AssocId, pdu: &Pdu) -> Route {
        let Some(front) = self.fronts.get_mut(&id) else {
            return Route::Violation("unknown client");
        };
        let root_id = front.root;

        let mut released = None;
        if let Some(hint) = pdu.header.proxy.as_deref() {
            let wanted = front.config.resolve(Some(hint));
            if wanted.as_ref().map(|t| &t.name) != front.target.as_ref().map(|t| &t.name) {
                debug!("client switches target to {hint}");
                front.target = wanted;
                released = front.back.take();
            }
        }
        if pdu.header.cookie.is_some() {
            front.cookie = pdu.header.cookie.clone();
        }

        let Some(target) = front.target.clone() else {
            return Route::Refuse(Diagnostic::database_unavailable("no target configured"));
        };
        let cookie = front.cookie.clone();
        let bound = front.back;
        let config = front.config.clone();

        let Some(root) = self.roots.get_mut(&root_id) else {
            return Route::Violation("listener is gone");
        };

        if let Some(old) = released {
            unbind(root, old, id);
        }

        let mut displaced = Vec::new();
        let mut evicted = Vec::new();

        let chosen = 'choose: {
            // 1. resume by cookie
            if let Some(cookie) = cookie.as_deref() {
                if let Some(bid) = root.pool.find_by_cookie(cookie, &target.name) {
                    let reset = root
                        .pool
                        .get(bid)
                        .is_some_and(|b| b.is_waiting() && pdu.is_init_request());
                    if reset {
                        let url = root.pool.get(bid).map(|b| b.url.clone()).unwrap_or_default();
                        info!("client restarted a busy session; re-dialling {url}");
                        if let Err(e) =
                            redial(root, &mut self.backs, links, bid, &target, url, &config)
                        {
                            warn!("re-dial failed: {e}");
                            if let Some(gone) = drop_entry(root, &mut self.backs, links, bid) {
                                displaced.extend(gone.front.filter(|f| *f != id));
                            }
                            break 'choose Err(Diagnostic::database_unavailable(&target.name));
                        }
                    }
                    break 'choose Ok(bid);
                }
            }

            // 2. reuse an idle session
            if cookie.is_none() && bound.is_none() {
                if let Some(bid) = root.pool.find_idle(&target.name) {
                    debug!("reusing idle session");
                    break 'choose Ok(bid);
                }
            }

            // 3. keep the current one
            if let Some(bid) = bound.filter(|b| root.pool.get(*b).is_some()) {
                break 'choose Ok(bid);
            }

            // 4. a new session, which has to start with a handshake
            if !pdu.is_init_request() {
                return Route::Violation("first message must be a handshake");
            }

            if root.pool.len() < root.ceiling() {
                let Some(url) = root.pick_url(&target, cookie.is_some()) else {
                    break 'choose Err(Diagnostic::database_unavailable(&target.name));
                };
                match open(root, &mut self.backs, links, &target, url, &config) {
                    Ok(bid) => break 'choose Ok(bid),
                    Err(e) => {
                        warn!("cannot reach {}: {e}", target.name);
                        break 'choose Err(Diagnostic::database_unavailable(&target.name));
                    }
                }
            }

            let Some(victim) = root.pool.oldest() else {
                break 'choose Err(Diagnostic::database_unavailable(&target.name));
            };
            let Some(back) = root.pool.get_mut(victim) else {
                break 'choose Err(Diagnostic::database_unavailable(&target.name));
            };
            evicted.extend(back.front.take().filter(|f| *f != id));

            if back.is_waiting() || back.target.name != target.name {
                info!("pool full; replacing session {}", back.seqno);
                let Some(url) = root.pick_url(&target, cookie.is_some()) else {
                    drop_entry(root, &mut self.backs, links, victim);
                    break 'choose Err(Diagnostic::database_unavailable(&target.name));
                };
                if let Err(e) = redial(root, &mut self.backs, links, victim, &target, url, &config)
                {
                    warn!("re-dial failed: {e}");
                    drop_entry(root, &mut self.backs, links, victim);
                    break 'choose Err(Diagnostic::database_unavailable(&target.name));
                }
            } else {
                info!("pool full; moving session {}", back.seqno);
            }
            Ok(victim)
        };

        let result = match chosen {
            Ok(bid) => {
                let seqno = root.next_seqno();
                if let Some(back) = root.pool.get_mut(bid) {
                    displaced.extend(back.front.replace(id).filter(|f| *f != id));
                    back.seqno = seqno;
                    back.cookie = cookie;
                }
                if let Some(old) = bound.filter(|b| *b != bid) {
                    unbind(root, old, id);
                }
                Route::Back(bid)
            }
            Err(diag) => Route::Refuse(diag),
        };

        for other in displaced.iter().chain(&evicted) {
            if let Some(f) = self.fronts.get_mut(other) {
                f.back = None;
            }
        }
        if let (Route::Back(bid), Some(front)) = (&result, self.fronts.get_mut(&id)) {
            front.back = Some(*bid);
        }
        for other in evicted {
            info!("evicting client {}", other.0);
            self.teardown_client(links, other);
        }

        result
    }

    /// Hand a response to a client in whatever protocol it speaks.
    fn deliver(&mut self, links: &mut dyn Links, id: AssocId, pdu: Pdu) {
        let Some(front) = self.fronts.get_mut(&id) else {
            return;
        };

        if front.mode == Mode::Native {
            if let Err(e) = send_pdu(links, id, &pdu) {
                warn!("{e}");
            }
            return;
        }

        let Some(exchange) = front.sru.as_mut() else {
            debug!("dropping {} for http client", pdu.name());
            return;
        };
        let (version, keep_alive) = (exchange.version, exchange.keep_alive);

        match exchange.advance(&pdu) {
            SruStep::Send(next) => self.client_request(links, id, next),
            SruStep::Done(res) => {
                front.sru = None;
                http_reply(links, id, res, version, keep_alive);
            }
        }
    }

    fn teardown_client(&mut self, links: &mut dyn Links, id: AssocId) {
        let Some(front) = self.fronts.remove(&id) else {
            return;
        };
        let span = session_span(&front.label);
        let _enter = span.enter();

        links.destroy(id);

        let Some(root) = self.roots.get_mut(&front.root) else {
            return;
        };

        if let Some(bid) = front.back {
            let keep = match root.pool.get_mut(bid) {
                Some(back) if back.front == Some(id) => {
                    back.front = None;
                    back.keep_alive()
                }
                _ => true,
            };
            if keep {
                debug!("keeping target session for reuse");
            } else {
                debug!("closing target session");
                drop_entry(root, &mut self.backs, links, bid);
            }
        }

        info!("client disconnected");
        prewarm(root, &mut self.backs, links);
    }
}

// -----------------------------------------------------------------------------
// ----- Target side -----------------------------------------------------------

impl Gateway {
    fn target_connected(&mut self, links: &mut dyn Links, at: BackRef) {
        let Some(root) = self.roots.get_mut(&at.root) else {
            return;
        };
        let config = root.config.clone();
        let Some(back) = root.pool.get_mut(at.id) else {
            return;
        };
        let span = session_span(&back.label);
        let _enter = span.enter();

        back.connected = true;
        links.set_idle_timeout(back.assoc, Some(config.target_timeout_for(&back.target)));
        info!("connected to {}", back.url);
    }

    fn target_frame(&mut self, links: &mut dyn Links, assoc: AssocId, frame: Bytes) {
        let Some(at) = self.backs.get(&assoc).copied() else {
            return;
        };
        let Some(back) = self.roots.get_mut(&at.root).and_then(|r| r.pool.get_mut(at.id)) else {
            return;
        };
        let span = session_span(&back.label);
        let _enter = span.enter();

        back.received_pdus += 1;
        back.received_bytes += frame.len() as u64;

        let pdu = match Pdu::from_bytes(&frame) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("undecodable message from {}: {e}", back.url);
                self.target_lost(links, assoc);
                return;
            }
        };
        debug!("received {} from {}", pdu.name(), back.url);

        let Some(response) = settle(back, pdu) else {
            return;
        };
        let response = back.stamp(response);
        let client = back.front;

        match client {
            Some(client) => self.deliver(links, client, response),
            None => debug!("no client waiting for {}", response.name()),
        }
    }

    /// The target connection broke, timed out, or sent garbage. The client
    /// keeps its connection and learns about it through a diagnostic.
    fn target_lost(&mut self, links: &mut dyn Links, assoc: AssocId) {
        let Some(at) = self.backs.get(&assoc).copied() else {
            return;
        };
        let Some(root) = self.roots.get_mut(&at.root) else {
            return;
        };
        let Some(back) = drop_entry(root, &mut self.backs, links, at.id) else {
            return;
        };

        let span = session_span(&back.label);
        let _enter = span.enter();
        info!("lost target session to {}", back.url);

        let Some(client) = back.front else {
            return;
        };
        if let Some(front) = self.fronts.get_mut(&client) {
            if front.back == Some(at.id) {
                front.back = None;
            }
        }
        for reply in back.failure_responses() {
            self.deliver(links, client, reply);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Planning --------------------------------------------------------------

/// Decide what to do with a client request on its target session.
fn plan(back: &mut BackSession, pdu: Pdu, config: &GatewayConfig) -> Outcome {
    let reference_id = pdu.header.reference_id.clone();
    let Pdu { header, body } = pdu.strip_hints();
    let in_flight = |pending| InFlight::new(reference_id.clone(), pending);
    let reply = |body| Outcome::Reply(Pdu::new(body).with_reference_id(reference_id.clone()));
    let refuse = |pdu: Pdu| Outcome::Reply(pdu.with_reference_id(reference_id.clone()));

    match body {
        Body::InitRequest(mut init) => {
            if let Some(replay) = back.replay_init(reference_id.clone()) {
                debug!("answering handshake from cache");
                return Outcome::Reply(replay);
            }
            if init.auth.is_none() {
                init.auth = config.proxy_auth_exposed().map(str::to_owned);
            }
            Outcome::Forward(
                Pdu {
                    header,
                    body: Body::InitRequest(init),
                },
                in_flight(Pending::Init { forward: true }),
            )
        }

        Body::SearchRequest(search) => {
            let esn = search.small_esn.as_deref().or(search.medium_esn.as_deref());
            let refused = check_query(&back.target.attributes, &search.query).or_else(|| {
                check_syntax(
                    &back.target.syntaxes,
                    search.preferred_syntax.as_deref(),
                    esn,
                )
            });
            if let Some(diag) = refused {
                return refuse(diag.search_response());
            }

            match back.results.plan_search(&search, config.optimize) {
                SearchPlan::Forward(pending) => Outcome::Forward(
                    Pdu {
                        header,
                        body: Body::SearchRequest(search),
                    },
                    in_flight(Pending::Search(pending)),
                ),
                SearchPlan::Reply(res) => reply(Body::SearchResponse(res)),
                SearchPlan::Present(present, pending) => Outcome::Forward(
                    Pdu {
                        header,
                        body: Body::PresentRequest(present),
                    },
                    in_flight(Pending::Present(pending)),
                ),
            }
        }

        Body::PresentRequest(mut present) => {
            if let Some(diag) = check_syntax(
                &back.target.syntaxes,
                present.syntax.as_deref(),
                present.esn.as_deref(),
            ) {
                return refuse(diag.present_response());
            }

            let ceiling = i32::try_from(back.target.limit.retrieve).unwrap_or(i32::MAX);
            if ceiling > 0 && present.count > ceiling {
                debug!("clamping present of {} records to {ceiling}", present.count);
                present.count = ceiling;
            }

            match back.results.plan_present(&present) {
                PresentPlan::Refuse(diag) => refuse(diag.present_response()),
                PresentPlan::Reply(res) => reply(Body::PresentResponse(res)),
                PresentPlan::Forward(pending) => Outcome::Forward(
                    Pdu {
                        header,
                        body: Body::PresentRequest(present),
                    },
                    in_flight(Pending::Present(pending)),
                ),
            }
        }

        body => Outcome::Forward(Pdu { header, body }, in_flight(Pending::Other)),
    }
}

/// Fold a target response into the session state; returns what the client
/// should see, if anything.
fn settle(back: &mut BackSession, pdu: Pdu) -> Option<Pdu> {
    let Some(in_flight) = back.in_flight.pop_front() else {
        return Some(pdu);
    };
    let Pdu { header, body } = pdu;

    let body = match (in_flight.pending, body) {
        (Pending::Init { forward }, body) => {
            let pdu = Pdu { header, body };
            back.remember_init(&pdu);
            return forward.then_some(pdu);
        }
        (Pending::Search(pending), Body::SearchResponse(res)) => {
            back.results.settle_search(&pending, &res);
            Body::SearchResponse(res)
        }
        (Pending::Present(pending), Body::PresentResponse(res)) => {
            back.results.settle_present(&pending, &res);
            match pending.as_search {
                Some(hits) => Body::SearchResponse(present_as_search(res, hits)),
                None => Body::PresentResponse(res),
            }
        }
        (_, body) => body,
    };

    Some(Pdu { header, body })
}

// -----------------------------------------------------------------------------
// ----- Pool plumbing ---------------------------------------------------------

fn open(
    root: &mut Root,
    backs: &mut HashMap<AssocId, BackRef>,
    links: &mut dyn Links,
    target: &Arc<TargetRecord>,
    url: String,
    config: &GatewayConfig,
) -> Result<BackId, GatewayError> {
    let assoc = links.connect(&url)?;
    links.set_idle_timeout(assoc, Some(config.connect_timeout));

    let label = root.next_label();
    info!("opening session {label} to {url}");
    let back = BackSession::new(assoc, label, target.clone(), url, config);
    let id = root.pool.insert(back);
    backs.insert(
        assoc,
        BackRef {
            root: root.listener,
            id,
        },
    );
    Ok(id)
}

/// Swap the connection under a pool slot for a fresh one to `url`.
fn redial(
    root: &mut Root,
    backs: &mut HashMap<AssocId, BackRef>,
    links: &mut dyn Links,
    id: BackId,
    target: &Arc<TargetRecord>,
    url: String,
    config: &GatewayConfig,
) -> Result<(), GatewayError> {
    let Some(back) = root.pool.get_mut(id) else {
        return Ok(());
    };
    backs.remove(&back.assoc);
    links.destroy(back.assoc);

    let assoc = links.connect(&url)?;
    links.set_idle_timeout(assoc, Some(config.connect_timeout));
    back.redial(assoc, target.clone(), url);
    backs.insert(
        assoc,
        BackRef {
            root: root.listener,
            id,
        },
    );
    Ok(())
}

fn drop_entry(
    root: &mut Root,
    backs: &mut HashMap<AssocId, BackRef>,
    links: &mut dyn Links,
    id: BackId,
) -> Option<BackSession> {
    let back = root.pool.remove(id)?;
    if backs.get(&back.assoc).is_some_and(|r| r.id == id) {
        backs.remove(&back.assoc);
    }
    links.destroy(back.assoc);
    Some(back)
}

fn unbind(root: &mut Root, id: BackId, front: AssocId) {
    if let Some(back) = root.pool.get_mut(id) {
        if back.front == Some(front) {
            back.front = None;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

pub(crate) fn send_pdu(links: &mut dyn Links, to: AssocId, pdu: &Pdu) -> Result<(), GatewayError> {
    let bytes = pdu.to_bytes().map_err(|source| GatewayError::Encode {
        pdu: pdu.name(),
        source,
    })?;
    links.send(to, bytes);
    Ok(())
}

fn http_reply(
    links: &mut dyn Links,
    id: AssocId,
    res: HttpResponse,
    version: HttpVersion,
    keep_alive: bool,
) {
    links.send(id, res.to_bytes(version, keep_alive));
    if !keep_alive {
        links.close_after_flush(id);
    }
}

fn session_span(label: &SessionLabel) -> Span {
    info_span!("session", label = %label)
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
