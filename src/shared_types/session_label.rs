use std::fmt;

// -----------------------------------------------------------------------------
// ----- SessionLabel ----------------------------------------------------------

/// `<root seed>:<counter>`, stamped on every log line of one client session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionLabel(String);

impl SessionLabel {
    pub fn new(seed: u64, counter: u64) -> Self {
        SessionLabel(format!("{seed}:{counter}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
