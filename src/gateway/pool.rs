use std::collections::HashMap;

use super::back::{BackId, BackSession};

// -----------------------------------------------------------------------------
// ----- Pool ------------------------------------------------------------------

/// Every back-end session of one listener, bound or not.
#[derive(Debug, Default)]
pub struct Pool {
    entries: HashMap<BackId, BackSession>,
    next_id: u64,
}

// -----------------------------------------------------------------------------
// ----- Pool: Public ----------------------------------------------------------

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, back: BackSession) -> BackId {
        let id = BackId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, back);
        id
    }

    pub fn remove(&mut self, id: BackId) -> Option<BackSession> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: BackId) -> Option<&BackSession> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: BackId) -> Option<&mut BackSession> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BackId, &BackSession)> {
        self.entries.iter().map(|(id, b)| (*id, b))
    }

    /// The most recently bound session carrying `cookie` for `target`.
    pub fn find_by_cookie(&self, cookie: &str, target: &str) -> Option<BackId> {
        self.iter()
            .filter(|(_, b)| b.cookie.as_deref() == Some(cookie) && b.target.name == target)
            .max_by_key(|(_, b)| b.seqno)
            .map(|(id, _)| id)
    }

    /// An unbound, quiet, cookie-less session for `target`.
    pub fn find_idle(&self, target: &str) -> Option<BackId> {
        self.iter()
            .filter(|(_, b)| b.is_idle() && b.cookie.is_none() && b.target.name == target)
            .min_by_key(|(id, b)| (b.seqno, *id))
            .map(|(id, _)| id)
    }

    /// Eviction candidate.
    pub fn oldest(&self) -> Option<BackId> {
        self.iter()
            .min_by_key(|(id, b)| (b.seqno, *id))
            .map(|(id, _)| id)
    }

    pub fn url_load(&self, url: &str) -> usize {
        self.iter().filter(|(_, b)| b.url == url).count()
    }

    /// Unbound cookie-less sessions on `url`, including ones still
    /// completing their handshake.
    pub fn spare_count(&self, target: &str, url: &str) -> usize {
        self.iter()
            .filter(|(_, b)| {
                b.front.is_none() && b.cookie.is_none() && b.target.name == target && b.url == url
            })
            .count()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
