use std::num::NonZeroUsize;

use lru::LruCache;

use crate::wire_protocol::Record;

// -----------------------------------------------------------------------------
// ----- RecordCache -----------------------------------------------------------

/// Records a back end has already delivered, keyed by result set and
/// 1-based position. A hit also has to match the syntax and element set the
/// record was rendered with.
#[derive(Debug)]
pub struct RecordCache {
    entries: LruCache<(String, i32), CachedRecord>,
}

#[derive(Debug, Clone)]
struct CachedRecord {
    syntax: Option<String>,
    esn: Option<String>,
    record: Record,
}

impl RecordCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert_run(
        &mut self,
        result_set: &str,
        start: i32,
        records: &[Record],
        syntax: Option<&str>,
        esn: Option<&str>,
    ) {
        for (offset, record) in records.iter().enumerate() {
            let Some(position) = i32::try_from(offset)
                .ok()
                .and_then(|offset| start.checked_add(offset))
            else {
                break;
            };
            self.entries.put(
                (result_set.to_owned(), position),
                CachedRecord {
                    syntax: syntax.map(str::to_owned),
                    esn: esn.map(str::to_owned),
                    record: record.clone(),
                },
            );
        }
    }

    /// The whole window `start..start + count`, or nothing.
    pub fn lookup_run(
        &mut self,
        result_set: &str,
        start: i32,
        count: i32,
        syntax: Option<&str>,
        esn: Option<&str>,
    ) -> Option<Vec<Record>> {
        if count <= 0 {
            return None;
        }

        let end = i64::from(start) + i64::from(count);
        let mut out = Vec::with_capacity((count as usize).min(self.entries.len()));
        for position in i64::from(start)..end {
            let position = i32::try_from(position).ok()?;
            let hit = self.entries.get(&(result_set.to_owned(), position))?;
            if hit.syntax.as_deref() != syntax || hit.esn.as_deref() != esn {
                return None;
            }
            out.push(hit.record.clone());
        }
        Some(out)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn rec(n: u8) -> Record {
        Record {
            database: "Default".into(),
            syntax: Some("usmarc".into()),
            data: Bytes::from(vec![n]),
        }
    }

    fn cache(cap: usize) -> RecordCache {
        RecordCache::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn full_window_hits() {
        let mut c = cache(10);
        c.insert_run("default", 1, &[rec(1), rec(2), rec(3)], Some("usmarc"), Some("F"));

        let got = c.lookup_run("default", 2, 2, Some("usmarc"), Some("F")).unwrap();
        assert_eq!(got, vec![rec(2), rec(3)]);
    }

    #[test]
    fn partial_window_misses() {
        let mut c = cache(10);
        c.insert_run("default", 1, &[rec(1), rec(2)], Some("usmarc"), None);
        assert!(c.lookup_run("default", 1, 3, Some("usmarc"), None).is_none());
        assert!(c.lookup_run("other", 1, 1, Some("usmarc"), None).is_none());
    }

    #[test]
    fn rendering_must_match() {
        let mut c = cache(10);
        c.insert_run("default", 1, &[rec(1)], Some("usmarc"), Some("B"));
        assert!(c.lookup_run("default", 1, 1, Some("usmarc"), Some("F")).is_none());
        assert!(c.lookup_run("default", 1, 1, Some("sutrs"), Some("B")).is_none());
        assert!(c.lookup_run("default", 1, 1, Some("usmarc"), Some("B")).is_some());
    }

    #[test]
    fn windows_at_the_top_of_the_range() {
        let mut c = cache(10);
        c.insert_run("default", i32::MAX - 1, &[rec(1), rec(2), rec(3)], None, None);
        assert_eq!(c.len(), 2);

        let got = c.lookup_run("default", i32::MAX - 1, 2, None, None).unwrap();
        assert_eq!(got, vec![rec(1), rec(2)]);
        assert!(c.lookup_run("default", i32::MAX - 1, 10, None, None).is_none());
        assert!(c.lookup_run("default", 1, i32::MAX, None, None).is_none());
    }

    #[test]
    fn bounded_and_clearable() {
        let mut c = cache(2);
        c.insert_run("default", 1, &[rec(1), rec(2), rec(3)], None, None);
        assert_eq!(c.len(), 2);
        assert!(c.lookup_run("default", 1, 1, None, None).is_none());

        c.clear();
        assert!(c.is_empty());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
