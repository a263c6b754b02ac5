//! REST-style search and explain over HTTP, carried out on the native
//! session as handshake, search, then present.

use std::fmt::Write as _;

use bytes::Bytes;
use smallvec::smallvec;

use super::diag_map::{bib1_to_sru, sru};
use super::optimize::next_position;
use super::transform::{QueryTransform, TransformError};
use crate::config::{TargetRecord, rules::schema_rule};
use crate::errors::Diagnostic;
use crate::wire_protocol::{
    Body, HttpRequest, HttpResponse, HttpVersion, Pdu, PresentRequest, Query, Record, Records,
    SearchRequest,
};

const SRU_VERSION: &str = "1.1";
const DEFAULT_DATABASE: &str = "Default";
const RESULT_SET: &str = "default";
const CONTENT_TYPE: &str = "text/xml";

// -----------------------------------------------------------------------------
// ----- SruDiagnostic ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SruDiagnostic {
    pub code: u32,
    pub details: Option<String>,
}

impl SruDiagnostic {
    pub fn new(code: u32, details: Option<&str>) -> Self {
        Self {
            code,
            details: details.map(str::to_owned),
        }
    }
}

impl From<&Diagnostic> for SruDiagnostic {
    fn from(d: &Diagnostic) -> Self {
        Self {
            code: bib1_to_sru(d.code),
            details: d.addinfo.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Request handling ------------------------------------------------------

pub enum SruAction {
    /// Answer right away.
    Respond(HttpResponse),
    /// Run a search on the back end.
    Search(SruExchange),
}

struct Params(Vec<(String, String)>);

impl Params {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Decide what an HTTP request asks for.
pub fn interpret(
    req: &HttpRequest,
    target: Option<&TargetRecord>,
    transform: &dyn QueryTransform,
) -> SruAction {
    let params = Params(req.params());

    match params.get("operation").unwrap_or("explain") {
        "explain" => SruAction::Respond(explain(target)),
        "searchRetrieve" => match SruExchange::from_params(req, &params, target, transform) {
            Ok(exchange) => SruAction::Search(exchange),
            Err(diag) => SruAction::Respond(diagnostic_response(&diag)),
        },
        other => SruAction::Respond(diagnostic_response(&SruDiagnostic::new(
            sru::UNSUPPORTED_OPERATION,
            Some(other),
        ))),
    }
}

pub fn explain(target: Option<&TargetRecord>) -> HttpResponse {
    match target.and_then(|t| t.explain.as_deref()) {
        Some(doc) => HttpResponse::new(200).with_body(CONTENT_TYPE, Bytes::from(doc.to_owned())),
        None => HttpResponse::new(404).with_body("text/plain", Bytes::from_static(b"no explain\n")),
    }
}

pub fn bad_request() -> HttpResponse {
    HttpResponse::new(400).with_body("text/plain", Bytes::from_static(b"bad request\n"))
}

// -----------------------------------------------------------------------------
// ----- SruExchange -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Search,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    Xml,
    String,
}

impl Packing {
    fn as_str(self) -> &'static str {
        match self {
            Packing::Xml => "xml",
            Packing::String => "string",
        }
    }
}

/// One searchRetrieve in progress.
#[derive(Debug, Clone)]
pub struct SruExchange {
    pub version: HttpVersion,
    pub keep_alive: bool,
    pub stage: Stage,
    query: Query,
    database: String,
    start_record: i32,
    maximum_records: i32,
    syntax: Option<String>,
    esn: Option<String>,
    packing: Packing,
    hits: i64,
}

pub enum SruStep {
    Send(Pdu),
    Done(HttpResponse),
}

impl SruExchange {
    fn from_params(
        req: &HttpRequest,
        params: &Params,
        target: Option<&TargetRecord>,
        transform: &dyn QueryTransform,
    ) -> Result<Self, SruDiagnostic> {
        let text = params.get("query").ok_or_else(|| {
            SruDiagnostic::new(sru::MANDATORY_PARAMETER_MISSING, Some("query"))
        })?;
        let query = transform.transform(text).map_err(|e| match e {
            TransformError::Empty => SruDiagnostic::new(sru::QUERY_SYNTAX_ERROR, Some(text)),
            TransformError::Unsupported(what) => {
                SruDiagnostic::new(sru::QUERY_SYNTAX_ERROR, Some(&what))
            }
        })?;

        let number = |name: &'static str, default: i32| -> Result<i32, SruDiagnostic> {
            match params.get(name) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<i32>()
                    .ok()
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| {
                        SruDiagnostic::new(sru::UNSUPPORTED_PARAMETER_VALUE, Some(name))
                    }),
            }
        };
        let start_record = number("startRecord", 1)?;
        let maximum_records = number("maximumRecords", 0)?;
        if start_record < 1 {
            return Err(SruDiagnostic::new(
                sru::UNSUPPORTED_PARAMETER_VALUE,
                Some("startRecord"),
            ));
        }

        let packing = match params.get("recordPacking").unwrap_or("xml") {
            "xml" => Packing::Xml,
            "string" => Packing::String,
            _ => {
                return Err(SruDiagnostic::new(
                    sru::UNSUPPORTED_PARAMETER_VALUE,
                    Some("recordPacking"),
                ));
            }
        };

        let (syntax, esn) = match params.get("recordSchema") {
            None => (Some("xml".to_owned()), None),
            Some(schema) => {
                let rules = target.map(|t| t.syntaxes.as_slice()).unwrap_or_default();
                match schema_rule(rules, schema) {
                    Some(rule) => (
                        rule.syntax_name().map(str::to_owned),
                        Some(schema.to_owned()),
                    ),
                    None if rules.is_empty() => (Some("xml".to_owned()), Some(schema.to_owned())),
                    None => return Err(SruDiagnostic::new(sru::UNKNOWN_SCHEMA, Some(schema))),
                }
            }
        };

        let database = match req.database() {
            "" => DEFAULT_DATABASE.to_owned(),
            db => db.to_owned(),
        };

        Ok(Self {
            version: req.version,
            keep_alive: req.keep_alive(),
            stage: Stage::Init,
            query,
            database,
            start_record,
            maximum_records,
            syntax,
            esn,
            packing,
            hits: 0,
        })
    }

    /// Every exchange opens with a handshake; a back end that already has one
    /// answers it from its cache.
    pub fn init_pdu(&self) -> Pdu {
        Pdu::init_request(None)
    }

    fn search_pdu(&self) -> Pdu {
        Pdu::new(Body::SearchRequest(SearchRequest {
            small_set_upper_bound: 0,
            large_set_lower_bound: 1,
            medium_set_present_number: 0,
            result_set_name: RESULT_SET.to_owned(),
            databases: smallvec![self.database.clone()],
            small_esn: None,
            medium_esn: None,
            preferred_syntax: self.syntax.clone(),
            query: self.query.clone(),
        }))
    }

    fn present_pdu(&self) -> Pdu {
        let remaining = self.hits - i64::from(self.start_record) + 1;
        let count = i64::from(self.maximum_records).min(remaining) as i32;
        Pdu::new(Body::PresentRequest(PresentRequest {
            result_set_id: RESULT_SET.to_owned(),
            start: self.start_record,
            count,
            esn: self.esn.clone(),
            syntax: self.syntax.clone(),
        }))
    }

    /// Feed the back end's answer to the current step.
    pub fn advance(&mut self, pdu: &Pdu) -> SruStep {
        match (&self.stage, &pdu.body) {
            (Stage::Init, Body::InitResponse(res)) => {
                if !res.accepted {
                    return self.fail(SruDiagnostic::new(
                        sru::GENERAL_SYSTEM_ERROR,
                        Some("target rejected the session"),
                    ));
                }
                self.stage = Stage::Search;
                SruStep::Send(self.search_pdu())
            }

            (Stage::Search, Body::SearchResponse(res)) => {
                if let Some(diag) = Diagnostic::from_records(&res.records) {
                    return self.fail((&diag).into());
                }
                if !res.status {
                    return self.fail(SruDiagnostic::new(sru::GENERAL_SYSTEM_ERROR, None));
                }

                self.hits = res.result_count;
                if self.maximum_records > 0 && self.hits >= i64::from(self.start_record) {
                    self.stage = Stage::Present;
                    return SruStep::Send(self.present_pdu());
                }
                SruStep::Done(self.render(&[], None))
            }

            (Stage::Present, Body::PresentResponse(res)) => match &res.records {
                Records::Database(records) => SruStep::Done(self.render(records, None)),
                Records::Diagnostic { .. } => {
                    let diag = Diagnostic::from_records(&res.records)
                        .map(|d| SruDiagnostic::from(&d))
                        .unwrap_or_else(|| SruDiagnostic::new(sru::GENERAL_SYSTEM_ERROR, None));
                    SruStep::Done(self.render(&[], Some(&diag)))
                }
                Records::None => SruStep::Done(self.render(&[], None)),
            },

            _ => self.fail(SruDiagnostic::new(
                sru::GENERAL_SYSTEM_ERROR,
                Some(pdu.name()),
            )),
        }
    }

    fn fail(&self, diag: SruDiagnostic) -> SruStep {
        SruStep::Done(self.render(&[], Some(&diag)))
    }

    fn render(&self, records: &[Record], diag: Option<&SruDiagnostic>) -> HttpResponse {
        let packed: Vec<(String, &Record)> = records
            .iter()
            .map(|r| (self.pack(r), r))
            .collect();
        render_packed(
            self.hits,
            &packed,
            self.start_record,
            self.esn.as_deref(),
            self.packing,
            diag,
        )
    }

    fn pack(&self, record: &Record) -> String {
        let text = String::from_utf8_lossy(&record.data);
        match self.packing {
            Packing::Xml => text.into_owned(),
            Packing::String => escape_xml(&text),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Rendering -------------------------------------------------------------

fn diagnostic_response(diag: &SruDiagnostic) -> HttpResponse {
    render_packed(0, &[], 1, None, Packing::Xml, Some(diag))
}

fn render_packed(
    hits: i64,
    records: &[(String, &Record)],
    start: i32,
    schema: Option<&str>,
    packing: Packing,
    diag: Option<&SruDiagnostic>,
) -> HttpResponse {
    let mut xml = String::with_capacity(512);
    xml.push_str("<?xml version=\"1.0\"?>\n");
    xml.push_str("<zs:searchRetrieveResponse xmlns:zs=\"http://www.loc.gov/zing/srw/\">\n");
    let _ = writeln!(xml, "<zs:version>{SRU_VERSION}</zs:version>");
    let _ = writeln!(xml, "<zs:numberOfRecords>{hits}</zs:numberOfRecords>");

    if !records.is_empty() {
        xml.push_str("<zs:records>\n");
        for (offset, (data, record)) in records.iter().enumerate() {
            let schema = schema
                .or(record.syntax.as_deref())
                .unwrap_or("xml");
            xml.push_str("<zs:record>\n");
            let _ = writeln!(xml, "<zs:recordSchema>{}</zs:recordSchema>", escape_xml(schema));
            let _ = writeln!(xml, "<zs:recordPacking>{}</zs:recordPacking>", packing.as_str());
            let _ = writeln!(xml, "<zs:recordData>{data}</zs:recordData>");
            let _ = writeln!(
                xml,
                "<zs:recordPosition>{}</zs:recordPosition>",
                i64::from(start) + offset as i64
            );
            xml.push_str("</zs:record>\n");
        }
        xml.push_str("</zs:records>\n");

        let next = next_position(start, i32::try_from(records.len()).unwrap_or(i32::MAX), hits);
        if next > 0 {
            let _ = writeln!(xml, "<zs:nextRecordPosition>{next}</zs:nextRecordPosition>");
        }
    }

    if let Some(diag) = diag {
        xml.push_str("<zs:diagnostics>\n");
        xml.push_str("<diagnostic xmlns=\"http://www.loc.gov/zing/srw/diagnostic/\">\n");
        let _ = writeln!(xml, "<uri>info:srw/diagnostic/1/{}</uri>", diag.code);
        if let Some(details) = &diag.details {
            let _ = writeln!(xml, "<details>{}</details>", escape_xml(details));
        }
        xml.push_str("</diagnostic>\n");
        xml.push_str("</zs:diagnostics>\n");
    }

    xml.push_str("</zs:searchRetrieveResponse>\n");
    HttpResponse::new(200).with_body(CONTENT_TYPE, Bytes::from(xml))
}

pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::transform::CqlPassthrough;
    use crate::wire_protocol::{PresentResponse, SearchResponse};

    fn get(target: &str) -> HttpRequest {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: gw\r\n\r\n");
        HttpRequest::parse(raw.as_bytes()).unwrap()
    }

    fn body(res: &HttpResponse) -> String {
        String::from_utf8(res.body.to_vec()).unwrap()
    }

    fn start(target: &str) -> SruExchange {
        match interpret(&get(target), None, &CqlPassthrough) {
            SruAction::Search(ex) => ex,
            SruAction::Respond(res) => panic!("unexpected response {}", body(&res)),
        }
    }

    fn record(data: &str) -> Record {
        Record {
            database: "Default".into(),
            syntax: Some("xml".into()),
            data: Bytes::from(data.to_owned()),
        }
    }

    #[test]
    fn explain_needs_a_document() {
        let SruAction::Respond(res) = interpret(&get("/Default"), None, &CqlPassthrough) else {
            panic!("explain should answer directly");
        };
        assert_eq!(res.status, 404);

        let mut target = TargetRecord::literal("t:210");
        target.explain = Some("<explain/>".into());
        let SruAction::Respond(res) =
            interpret(&get("/?operation=explain"), Some(&target), &CqlPassthrough)
        else {
            panic!("explain should answer directly");
        };
        assert_eq!(res.status, 200);
        assert_eq!(body(&res), "<explain/>");
    }

    #[test]
    fn missing_query_is_an_sru_diagnostic() {
        let SruAction::Respond(res) =
            interpret(&get("/db?operation=searchRetrieve"), None, &CqlPassthrough)
        else {
            panic!("expected a direct answer");
        };
        assert_eq!(res.status, 200);
        assert!(body(&res).contains("info:srw/diagnostic/1/7"));
    }

    #[test]
    fn unknown_operation_is_refused() {
        let SruAction::Respond(res) =
            interpret(&get("/db?operation=scan"), None, &CqlPassthrough)
        else {
            panic!("expected a direct answer");
        };
        assert!(body(&res).contains("info:srw/diagnostic/1/4"));
    }

    #[test]
    fn search_then_present_then_render() {
        let mut ex =
            start("/Books?operation=searchRetrieve&query=dc.title%3Dwater&maximumRecords=2");
        assert!(ex.init_pdu().is_init_request());

        let SruStep::Send(search) = ex.advance(&Pdu::init_response(true)) else {
            panic!("expected a search");
        };
        match &search.body {
            Body::SearchRequest(sr) => {
                assert_eq!(sr.query, Query::Cql("dc.title=water".into()));
                assert_eq!(sr.databases.as_slice(), ["Books".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let hits = Pdu::new(Body::SearchResponse(SearchResponse {
            result_count: 5,
            returned: 0,
            next_position: 1,
            status: true,
            records: Records::None,
        }));
        let SruStep::Send(present) = ex.advance(&hits) else {
            panic!("expected a present");
        };
        match &present.body {
            Body::PresentRequest(pr) => assert_eq!((pr.start, pr.count), (1, 2)),
            other => panic!("unexpected {other:?}"),
        }

        let records = Pdu::new(Body::PresentResponse(PresentResponse {
            returned: 2,
            next_position: 3,
            status: true,
            records: Records::Database(vec![record("<a/>"), record("<b/>")]),
        }));
        let SruStep::Done(res) = ex.advance(&records) else {
            panic!("expected the final answer");
        };

        let xml = body(&res);
        assert!(xml.contains("<zs:numberOfRecords>5</zs:numberOfRecords>"));
        assert!(xml.contains("<zs:recordData><b/></zs:recordData>"));
        assert!(xml.contains("<zs:recordPosition>2</zs:recordPosition>"));
        assert!(xml.contains("<zs:nextRecordPosition>3</zs:nextRecordPosition>"));
    }

    #[test]
    fn zero_maximum_records_skips_present() {
        let mut ex = start("/?operation=searchRetrieve&query=water");
        let _ = ex.advance(&Pdu::init_response(true));

        let hits = Pdu::new(Body::SearchResponse(SearchResponse {
            result_count: 40,
            returned: 0,
            next_position: 1,
            status: true,
            records: Records::None,
        }));
        let SruStep::Done(res) = ex.advance(&hits) else {
            panic!("expected the final answer");
        };
        assert!(body(&res).contains("<zs:numberOfRecords>40</zs:numberOfRecords>"));
    }

    #[test]
    fn target_diagnostics_are_mapped() {
        let mut ex = start("/?operation=searchRetrieve&query=water&maximumRecords=5");
        let _ = ex.advance(&Pdu::init_response(true));

        let failed = Diagnostic::new(114).with_addinfo("9999").search_response();
        let SruStep::Done(res) = ex.advance(&failed) else {
            panic!("expected the final answer");
        };
        let xml = body(&res);
        assert!(xml.contains("info:srw/diagnostic/1/16"));
        assert!(xml.contains("<details>9999</details>"));
    }

    #[test]
    fn string_packing_escapes_records() {
        let mut ex = start(
            "/?operation=searchRetrieve&query=water&maximumRecords=1&recordPacking=string",
        );
        let _ = ex.advance(&Pdu::init_response(true));
        let _ = ex.advance(&Pdu::new(Body::SearchResponse(SearchResponse {
            result_count: 1,
            returned: 0,
            next_position: 1,
            status: true,
            records: Records::None,
        })));

        let SruStep::Done(res) = ex.advance(&Pdu::new(Body::PresentResponse(PresentResponse {
            returned: 1,
            next_position: 0,
            status: true,
            records: Records::Database(vec![record("<a/>")]),
        }))) else {
            panic!("expected the final answer");
        };
        let xml = body(&res);
        assert!(xml.contains("&lt;a/&gt;"));
        assert!(!xml.contains("nextRecordPosition"));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
