use crate::wire_protocol::{Body, Pdu, PresentResponse, Records, SearchResponse};

// -----------------------------------------------------------------------------
// ----- Bib-1 diagnostic codes ------------------------------------------------

pub mod bib1 {
    pub const PERMANENT_SYSTEM_ERROR: u32 = 1;
    pub const TEMPORARY_SYSTEM_ERROR: u32 = 2;
    pub const PRESENT_OUT_OF_RANGE: u32 = 13;
    pub const ESN_NOT_SUPPORTED: u32 = 25;
    pub const RESULT_SET_MISSING: u32 = 30;
    pub const UNSPECIFIED: u32 = 100;
    pub const DATABASE_UNAVAILABLE: u32 = 109;
    pub const UNSUPPORTED_USE_ATTRIBUTE: u32 = 114;
    pub const DATABASE_MISSING: u32 = 235;
    pub const RECORD_SYNTAX_UNSUPPORTED: u32 = 238;
    pub const RECORD_SYNTAX_NOT_AVAILABLE: u32 = 239;
}

// -----------------------------------------------------------------------------
// ----- Diagnostic ------------------------------------------------------------

/// A protocol-level failure reported to the client instead of a result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: u32,
    pub addinfo: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- Diagnostic: Static ----------------------------------------------------

impl Diagnostic {
    pub fn new(code: u32) -> Self {
        Self {
            code,
            addinfo: None,
        }
    }

    pub fn temporary_system_error() -> Self {
        Self::new(bib1::TEMPORARY_SYSTEM_ERROR)
    }

    pub fn result_set_missing(name: impl Into<String>) -> Self {
        Self::new(bib1::RESULT_SET_MISSING).with_addinfo(name)
    }

    pub fn present_out_of_range() -> Self {
        Self::new(bib1::PRESENT_OUT_OF_RANGE)
    }

    pub fn database_unavailable(target: impl Into<String>) -> Self {
        Self::new(bib1::DATABASE_UNAVAILABLE).with_addinfo(target)
    }
}

// -----------------------------------------------------------------------------
// ----- Diagnostic: Builder ---------------------------------------------------

impl Diagnostic {
    pub fn with_addinfo(mut self, addinfo: impl Into<String>) -> Self {
        self.addinfo = Some(addinfo.into());
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Diagnostic: Public ----------------------------------------------------

impl Diagnostic {
    pub fn from_records(records: &Records) -> Option<Self> {
        match records {
            Records::Diagnostic { code, addinfo } => Some(Diagnostic {
                code: *code,
                addinfo: addinfo.clone(),
            }),
            _ => None,
        }
    }

    pub fn to_records(&self) -> Records {
        Records::Diagnostic {
            code: self.code,
            addinfo: self.addinfo.clone(),
        }
    }

    pub fn search_response(&self) -> Pdu {
        Pdu::new(Body::SearchResponse(SearchResponse {
            result_count: 0,
            returned: 0,
            next_position: 0,
            status: false,
            records: self.to_records(),
        }))
    }

    pub fn present_response(&self) -> Pdu {
        Pdu::new(Body::PresentResponse(PresentResponse {
            returned: 0,
            next_position: 0,
            status: false,
            records: self.to_records(),
        }))
    }

    /// The failure-shaped answer to `request`, carrying its reference id.
    /// Handshakes are refused outright; anything unmodelled gets a search
    /// response since that is the one every client understands.
    pub fn response_to(&self, request: &Pdu) -> Pdu {
        let pdu = match &request.body {
            Body::InitRequest(_) => Pdu::init_response(false),
            Body::PresentRequest(_) => self.present_response(),
            _ => self.search_response(),
        };
        pdu.with_reference_id(request.header.reference_id.clone())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire_protocol::{PresentRequest, WireSerializable};

    #[test]
    fn builds_result_set_missing() {
        let d = Diagnostic::result_set_missing("nope");
        assert_eq!(d.code, 30);
        assert_eq!(d.addinfo.as_deref(), Some("nope"));
    }

    #[test]
    fn present_request_gets_present_shaped_answer() {
        let req = Pdu::new(Body::PresentRequest(PresentRequest {
            result_set_id: "default".into(),
            start: 10,
            count: 5,
            esn: None,
            syntax: None,
        }))
        .with_reference_id(Some("ref-7".into()));

        let res = Diagnostic::present_out_of_range().response_to(&req);

        assert_eq!(res.header.reference_id.as_deref(), Some("ref-7"));
        match res.body {
            Body::PresentResponse(p) => {
                assert!(!p.status);
                assert_eq!(
                    p.records,
                    Records::Diagnostic {
                        code: 13,
                        addinfo: None
                    }
                );
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn handshake_is_refused() {
        let res = Diagnostic::temporary_system_error().response_to(&Pdu::init_request(None));
        assert_eq!(res.body, Pdu::init_response(false).body);
        assert!(res.to_bytes().is_ok());
    }

    #[test]
    fn records_convert_back() {
        let d = Diagnostic::new(114).with_addinfo("1=9999");
        assert_eq!(Diagnostic::from_records(&d.to_records()), Some(d));
        assert_eq!(Diagnostic::from_records(&Records::None), None);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
