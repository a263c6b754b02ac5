//! Per back-end result-set bookkeeping: which sets exist on the target, how
//! many hits they hold, what the last successful search was, and the records
//! already seen. Searches and presents are planned against it so that
//! repeated or out-of-range requests never reach the target.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use tracing::debug;

use super::record_cache::RecordCache;
use crate::errors::Diagnostic;
use crate::shared_types::QueryFingerprint;
use crate::wire_protocol::{PresentRequest, PresentResponse, Records, SearchRequest, SearchResponse};

// -----------------------------------------------------------------------------
// ----- Decisions -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SearchPlan {
    /// Send the request as is; the response settles `pending`.
    Forward(PendingSearch),
    /// Answer locally.
    Reply(SearchResponse),
    /// Ask for the records with a present and turn its answer back into a
    /// search response.
    Present(PresentRequest, PendingPresent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresentPlan {
    Forward(PendingPresent),
    Reply(PresentResponse),
    Refuse(Diagnostic),
}

/// What a forwarded search needs to be settled when its answer arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSearch {
    pub fingerprint: QueryFingerprint,
    pub result_set: String,
    pub small_set_upper_bound: i32,
    pub small_esn: Option<String>,
    pub medium_esn: Option<String>,
    pub syntax: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPresent {
    pub result_set: String,
    pub start: i32,
    pub esn: Option<String>,
    pub syntax: Option<String>,
    /// Hit count to report when the answer goes back as a search response.
    pub as_search: Option<i64>,
}

// -----------------------------------------------------------------------------
// ----- ResultSets ------------------------------------------------------------

#[derive(Debug)]
pub struct ResultSets {
    last: Option<LastSearch>,
    known: HashMap<String, i64>,
    records: RecordCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastSearch {
    fingerprint: QueryFingerprint,
    hits: i64,
}

// -----------------------------------------------------------------------------
// ----- ResultSets: Static ----------------------------------------------------

impl ResultSets {
    pub fn new(cache_size: NonZeroUsize) -> Self {
        Self {
            last: None,
            known: HashMap::new(),
            records: RecordCache::new(cache_size),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ResultSets: Public ----------------------------------------------------

impl ResultSets {
    /// Forget everything; the target side session is gone.
    pub fn reset(&mut self) {
        self.last = None;
        self.known.clear();
        self.records.clear();
    }

    pub fn hits(&self, result_set: &str) -> Option<i64> {
        self.known.get(result_set).copied()
    }

    pub fn cached_records(&self) -> usize {
        self.records.len()
    }

    pub fn plan_search(&mut self, req: &SearchRequest, optimize: bool) -> SearchPlan {
        let fingerprint =
            QueryFingerprint::new(&req.query, &req.result_set_name, &req.databases);

        let repeat = self
            .last
            .as_ref()
            .filter(|last| optimize && last.fingerprint == fingerprint)
            .map(|last| last.hits);

        let Some(hits) = repeat else {
            self.last = None;
            self.known.remove(&req.result_set_name);
            self.records.clear();
            return SearchPlan::Forward(pending_search(fingerprint, req));
        };

        let large = hits >= i64::from(req.large_set_lower_bound) || hits <= 0;
        if large {
            debug!("repeat search on large set; answering locally");
            return SearchPlan::Reply(search_reply(hits, 0, Records::None));
        }

        let (count, esn) = if hits > i64::from(req.small_set_upper_bound) {
            let n = i64::from(req.medium_set_present_number).min(hits);
            (n as i32, req.medium_esn.clone())
        } else {
            (hits as i32, req.small_esn.clone())
        };

        if count <= 0 {
            return SearchPlan::Reply(search_reply(hits, 0, Records::None));
        }

        let syntax = req.preferred_syntax.clone();
        if let Some(records) = self.records.lookup_run(
            &req.result_set_name,
            1,
            count,
            syntax.as_deref(),
            esn.as_deref(),
        ) {
            debug!("repeat search with {count} cached records; answering locally");
            return SearchPlan::Reply(search_reply(hits, count, Records::Database(records)));
        }

        debug!("repeat search; fetching {count} records with a present");
        let present = PresentRequest {
            result_set_id: req.result_set_name.clone(),
            start: 1,
            count,
            esn: esn.clone(),
            syntax: syntax.clone(),
        };
        let pending = PendingPresent {
            result_set: req.result_set_name.clone(),
            start: 1,
            esn,
            syntax,
            as_search: Some(hits),
        };
        SearchPlan::Present(present, pending)
    }

    /// Only result sets established on this back end can be retrieved from,
    /// and only within their hit count.
    pub fn plan_present(&mut self, req: &PresentRequest) -> PresentPlan {
        let Some(hits) = self.hits(&req.result_set_id) else {
            return PresentPlan::Refuse(Diagnostic::result_set_missing(&req.result_set_id));
        };

        let end = i64::from(req.start) + i64::from(req.count) - 1;
        if req.start < 1 || req.count < 0 || end > hits || end > i64::from(i32::MAX) {
            return PresentPlan::Refuse(Diagnostic::present_out_of_range());
        }

        if let Some(records) = self.records.lookup_run(
            &req.result_set_id,
            req.start,
            req.count,
            req.syntax.as_deref(),
            req.esn.as_deref(),
        ) {
            let returned = records.len() as i32;
            return PresentPlan::Reply(PresentResponse {
                returned,
                next_position: next_position(req.start, returned, hits),
                status: true,
                records: Records::Database(records),
            });
        }

        PresentPlan::Forward(PendingPresent {
            result_set: req.result_set_id.clone(),
            start: req.start,
            esn: req.esn.clone(),
            syntax: req.syntax.clone(),
            as_search: None,
        })
    }

    /// A search succeeded when its status is set and it carries no
    /// diagnostic. Only then does it become the reference for repeats.
    pub fn settle_search(&mut self, pending: &PendingSearch, res: &SearchResponse) {
        let ok = res.status && !matches!(res.records, Records::Diagnostic { .. });
        if !ok {
            self.last = None;
            self.known.remove(&pending.result_set);
            return;
        }

        self.last = Some(LastSearch {
            fingerprint: pending.fingerprint,
            hits: res.result_count,
        });
        self.known
            .insert(pending.result_set.clone(), res.result_count);

        if let Records::Database(records) = &res.records {
            let esn = if res.result_count > i64::from(pending.small_set_upper_bound) {
                pending.medium_esn.as_deref()
            } else {
                pending.small_esn.as_deref()
            };
            self.records.insert_run(
                &pending.result_set,
                1,
                records,
                pending.syntax.as_deref(),
                esn,
            );
        }
    }

    pub fn settle_present(&mut self, pending: &PendingPresent, res: &PresentResponse) {
        if let Records::Database(records) = &res.records {
            self.records.insert_run(
                &pending.result_set,
                pending.start,
                records,
                pending.syntax.as_deref(),
                pending.esn.as_deref(),
            );
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// Position of the first record not yet returned, zero past the end.
pub fn next_position(start: i32, returned: i32, hits: i64) -> i32 {
    let next = i64::from(start) + i64::from(returned);
    if next > hits {
        return 0;
    }
    i32::try_from(next).unwrap_or(0)
}

/// A present answer re-shaped as the search response it stands in for.
pub fn present_as_search(res: PresentResponse, hits: i64) -> SearchResponse {
    SearchResponse {
        result_count: hits,
        returned: res.returned,
        next_position: res.next_position,
        status: res.status,
        records: res.records,
    }
}

fn search_reply(hits: i64, returned: i32, records: Records) -> SearchResponse {
    SearchResponse {
        result_count: hits,
        returned,
        next_position: next_position(1, returned, hits),
        status: true,
        records,
    }
}

fn pending_search(fingerprint: QueryFingerprint, req: &SearchRequest) -> PendingSearch {
    PendingSearch {
        fingerprint,
        result_set: req.result_set_name.clone(),
        small_set_upper_bound: req.small_set_upper_bound,
        small_esn: req.small_esn.clone(),
        medium_esn: req.medium_esn.clone(),
        syntax: req.preferred_syntax.clone(),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
