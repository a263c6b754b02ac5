use std::collections::HashMap;

use once_cell::sync::Lazy;

// -----------------------------------------------------------------------------
// ----- bib-1 to SRU ----------------------------------------------------------

/// SRU diagnostics the REST side raises on its own.
pub mod sru {
    pub const GENERAL_SYSTEM_ERROR: u32 = 1;
    pub const UNSUPPORTED_OPERATION: u32 = 4;
    pub const UNSUPPORTED_PARAMETER_VALUE: u32 = 6;
    pub const MANDATORY_PARAMETER_MISSING: u32 = 7;
    pub const QUERY_SYNTAX_ERROR: u32 = 10;
    pub const UNKNOWN_SCHEMA: u32 = 66;
}

static BIB1_TO_SRU: Lazy<HashMap<u32, u32>> = Lazy::new(|| {
    HashMap::from([
        (1, 1),
        (2, 2),
        (3, 48),
        (4, 35),
        (5, 38),
        (6, 39),
        (11, 2),
        (13, 61),
        (14, 63),
        (22, 50),
        (25, 67),
        (27, 51),
        (30, 51),
        (100, 1),
        (108, 10),
        (109, 2),
        (110, 37),
        (111, 1),
        (112, 58),
        (113, 10),
        (114, 16),
        (115, 16),
        (116, 16),
        (117, 19),
        (118, 22),
        (119, 32),
        (120, 28),
        (121, 15),
        (122, 32),
        (123, 22),
        (124, 24),
        (125, 36),
        (126, 36),
        (235, 235),
        (236, 236),
        (237, 82),
        (238, 67),
        (239, 66),
    ])
});

/// SRU diagnostic number for a bib-1 code. Anything unmapped is a general
/// system error.
pub fn bib1_to_sru(code: u32) -> u32 {
    BIB1_TO_SRU
        .get(&code)
        .copied()
        .unwrap_or(sru::GENERAL_SYSTEM_ERROR)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
