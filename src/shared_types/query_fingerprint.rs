use md5::Context;

use crate::wire_protocol::Query;

// -----------------------------------------------------------------------------
// ----- QueryFingerprint ------------------------------------------------------

/// Digest of everything that makes two searches interchangeable: the query,
/// the result-set name it lands in, and the databases it runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryFingerprint(pub(crate) [u8; 16]);

impl QueryFingerprint {
    pub fn new(query: &Query, result_set: &str, databases: &[String]) -> Self {
        let mut ctx = Context::new();

        match query {
            Query::Rpn(q) => {
                ctx.consume(b"rpn");
                ctx.consume([0]);
                ctx.consume(q.trim().as_bytes());
            }
            Query::Cql(q) => {
                ctx.consume(b"cql");
                ctx.consume([0]);
                ctx.consume(q.trim().as_bytes());
            }
        }
        ctx.consume([0]);

        ctx.consume(result_set.as_bytes());
        ctx.consume([0]);

        for db in databases {
            ctx.consume(db.as_bytes());
            ctx.consume([0]);
        }

        QueryFingerprint(ctx.compute().0)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dbs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn same_inputs_same_fingerprint() {
        let q = Query::Rpn("@attr 1=4 water".into());
        assert_eq!(
            QueryFingerprint::new(&q, "default", &dbs(&["Default"])),
            QueryFingerprint::new(&q, "default", &dbs(&["Default"])),
        );
    }

    #[test]
    fn every_component_matters() {
        let q = Query::Rpn("water".into());
        let base = QueryFingerprint::new(&q, "default", &dbs(&["Default"]));

        assert_ne!(base, QueryFingerprint::new(&Query::Cql("water".into()), "default", &dbs(&["Default"])));
        assert_ne!(base, QueryFingerprint::new(&Query::Rpn("fire".into()), "default", &dbs(&["Default"])));
        assert_ne!(base, QueryFingerprint::new(&q, "other", &dbs(&["Default"])));
        assert_ne!(base, QueryFingerprint::new(&q, "default", &dbs(&["Default", "Books"])));
    }

    #[test]
    fn database_boundaries_are_not_ambiguous() {
        let q = Query::Rpn("x".into());
        assert_ne!(
            QueryFingerprint::new(&q, "s", &dbs(&["ab", "c"])),
            QueryFingerprint::new(&q, "s", &dbs(&["a", "bc"])),
        );
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
