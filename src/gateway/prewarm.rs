use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TargetRecord;
use crate::net::{AssocId, Links};
use crate::wire_protocol::Pdu;

use super::back::{BackRef, BackSession, InFlight, Pending};
use super::error::GatewayError;
use super::root::Root;
use super::session::send_pdu;

// -----------------------------------------------------------------------------
// ----- Pre-warming -----------------------------------------------------------

/// Top up every target with a `preinit` count to that many spare sessions
/// per URL, as far as the pool ceiling allows. Each new session performs its
/// handshake right away so the first client finds it ready.
pub fn prewarm(root: &mut Root, backs: &mut HashMap<AssocId, BackRef>, links: &mut dyn Links) {
    let config = root.config.clone();

    for target in config.targets.iter().filter(|t| t.preinit > 0) {
        for url in &target.urls {
            let mut spare = root.pool.spare_count(&target.name, url);

            while spare < target.preinit && root.pool.len() < root.ceiling() {
                if let Err(e) = open(root, backs, links, target, url) {
                    warn!("pre-warming {} on {url} failed: {e}", target.name);
                    break;
                }
                spare += 1;
            }
        }
    }
}

fn open(
    root: &mut Root,
    backs: &mut HashMap<AssocId, BackRef>,
    links: &mut dyn Links,
    target: &Arc<TargetRecord>,
    url: &str,
) -> Result<(), GatewayError> {
    let assoc = links.connect(url)?;

    let init = Pdu::init_request(root.config.proxy_auth_exposed().map(str::to_owned));
    if let Err(e) = send_pdu(links, assoc, &init) {
        links.destroy(assoc);
        return Err(e);
    }
    links.set_idle_timeout(assoc, Some(root.config.connect_timeout));

    let label = root.next_label();
    let mut back = BackSession::new(assoc, label, target.clone(), url.to_owned(), &root.config);
    back.seqno = root.next_seqno();
    back
        .in_flight
        .push_back(InFlight::new(None, Pending::Init { forward: false }));

    debug!("pre-warming {} on {url} as {}", target.name, back.label);
    let id = root.pool.insert(back);
    backs.insert(
        assoc,
        BackRef {
            root: root.listener,
            id,
        },
    );
    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
