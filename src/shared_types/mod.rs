pub mod query_fingerprint;
pub mod session_label;

pub use query_fingerprint::QueryFingerprint;
pub use session_label::SessionLabel;
