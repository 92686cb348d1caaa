//! Provider response parser.
//!
//! The provider cannot be held to bare JSON while search grounding is
//! active, so the parser digs the array out of whatever surrounds it:
//! - trim whitespace
//! - drop a leading code fence (optionally language tagged) and a trailing one
//! - slice from the first `[` to the last `]` and parse that as JSON
//!
//! Formatting noise is tolerated; a missing or broken array is not.

use std::sync::LazyLock;

use chrono::Utc;
use grantscout_shared::{Grant, GrantId, GrantScoutError, GrantStatus, Result};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::scoring::ConfidenceScorer;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Grants recovered from one provider response.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    /// Grants in the order the provider listed them.
    pub grants: Vec<Grant>,
    /// Array elements dropped because they were not objects or had no title.
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches an opening fence with an optional language tag.
static OPEN_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("open fence regex"));

/// Matches a closing fence at the very end.
static CLOSE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("close fence regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse raw provider text into grants, scoring each with `scorer`.
pub fn parse_response(raw: &str, scorer: &dyn ConfidenceScorer) -> Result<ParsedBatch> {
    let slice = recover_json_array(raw)?;

    let elements: Vec<Value> = serde_json::from_str(slice)
        .map_err(|e| GrantScoutError::parse(format!("payload is not a valid JSON array: {e}")))?;

    let mut batch = ParsedBatch::default();
    for (index, element) in elements.iter().enumerate() {
        match coerce_grant(element, scorer) {
            Some(grant) => batch.grants.push(grant),
            None => {
                warn!(index, "dropping array element without an object body or program_title");
                batch.rejected += 1;
            }
        }
    }

    debug!(
        parsed = batch.grants.len(),
        rejected = batch.rejected,
        "provider response parsed"
    );

    Ok(batch)
}

/// Locate the bracket-delimited JSON array inside noisy provider text.
///
/// Returns the slice from the first `[` to the last `]`, inclusive.
pub fn recover_json_array(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    let without_open = match OPEN_FENCE_RE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let body = match CLOSE_FENCE_RE.find(without_open) {
        Some(m) => &without_open[..m.start()],
        None => without_open,
    };

    let start = body
        .find('[')
        .ok_or_else(|| GrantScoutError::parse("no '[' found in provider response"))?;
    let end = body
        .rfind(']')
        .ok_or_else(|| GrantScoutError::parse("no ']' found in provider response"))?;

    if end < start {
        return Err(GrantScoutError::parse(
            "closing ']' precedes opening '[' in provider response",
        ));
    }

    Ok(&body[start..=end])
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Build a grant from one array element, coercing each field.
///
/// Returns `None` when the element is not an object or has a blank title,
/// since such a record could never be deduplicated.
fn coerce_grant(element: &Value, scorer: &dyn ConfidenceScorer) -> Option<Grant> {
    let obj = element.as_object()?;

    let program_title = text_field(obj, "program_title");
    if program_title.trim().is_empty() {
        return None;
    }

    Some(Grant {
        id: GrantId::new(),
        agency_name: text_field(obj, "agency_name"),
        program_title,
        funding_type: text_field(obj, "funding_type"),
        brief_description: text_field(obj, "brief_description"),
        eligibility_criteria: text_field(obj, "eligibility_criteria"),
        application_deadline: optional_field(obj, "application_deadline"),
        funding_amount: optional_field(obj, "funding_amount"),
        geographic_scope: text_field(obj, "geographic_scope"),
        official_application_link: text_field(obj, "official_application_link"),
        status: obj
            .get("status")
            .and_then(Value::as_str)
            .map(GrantStatus::parse_lenient)
            .unwrap_or_default(),
        confidence_score: scorer.score(element),
        discovered_at: Utc::now(),
    })
}

/// Required string field. Scalars are stringified, anything else is empty.
fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(scalar_to_string).unwrap_or_default()
}

/// Optional string field. Null, missing, blank and non-scalars are `None`.
fn optional_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(scalar_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{FixedScorer, MAX_CONFIDENCE, MIN_CONFIDENCE, RandomScorer};

    const TWO_GRANTS: &str = r#"[
  {"agency_name": "DOE", "program_title": "Solar Futures", "funding_type": "Grant",
   "brief_description": "PV research", "eligibility_criteria": "Universities",
   "application_deadline": "2026-05-01", "funding_amount": "$2M",
   "geographic_scope": "US", "official_application_link": "https://energy.gov/solar",
   "status": "OPEN"},
  {"agency_name": "NSF", "program_title": "Grid Resilience",
   "funding_type": "Cooperative Agreement",
   "brief_description": "Grid work", "eligibility_criteria": "Nonprofits",
   "application_deadline": null, "funding_amount": null,
   "geographic_scope": "US", "official_application_link": "https://nsf.gov/grid",
   "status": "UPCOMING"}
]"#;

    fn titles(batch: &ParsedBatch) -> Vec<&str> {
        batch.grants.iter().map(|g| g.program_title.as_str()).collect()
    }

    #[test]
    fn parses_bare_array() {
        let batch = parse_response(TWO_GRANTS, &FixedScorer(0.93)).unwrap();
        assert_eq!(titles(&batch), vec!["Solar Futures", "Grid Resilience"]);
        assert_eq!(batch.rejected, 0);

        let first = &batch.grants[0];
        assert_eq!(first.agency_name, "DOE");
        assert_eq!(first.application_deadline.as_deref(), Some("2026-05-01"));
        assert_eq!(first.status, GrantStatus::Open);
        assert_eq!(first.confidence_score, 0.93);

        let second = &batch.grants[1];
        assert!(second.application_deadline.is_none());
        assert!(second.funding_amount.is_none());
        assert_eq!(second.status, GrantStatus::Upcoming);
    }

    #[test]
    fn tolerates_prose_and_fences() {
        let wrappings = [
            format!("```json\n{TWO_GRANTS}\n```"),
            format!("```\n{TWO_GRANTS}\n```"),
            format!("Here is what I found:\n\n{TWO_GRANTS}\n\nLet me know if you need more."),
            format!("  \n```json\nSure! {TWO_GRANTS} Sources are cited above.\n```  \n"),
        ];

        let reference = parse_response(TWO_GRANTS, &FixedScorer(0.9)).unwrap();
        for wrapped in &wrappings {
            let batch = parse_response(wrapped, &FixedScorer(0.9))
                .unwrap_or_else(|e| panic!("failed on {wrapped:?}: {e}"));
            assert_eq!(batch.grants.len(), reference.grants.len());
            for (got, want) in batch.grants.iter().zip(&reference.grants) {
                // Identity and parse time differ per call; every other field must match.
                let mut got = got.clone();
                got.id = want.id.clone();
                got.discovered_at = want.discovered_at;
                assert_eq!(&got, want, "field mismatch for {wrapped:?}");
            }
        }
    }

    #[test]
    fn bracket_in_leading_prose_breaks_the_slice() {
        let wrapped = format!("Results (see [1]):\n{TWO_GRANTS}");
        let err = parse_response(&wrapped, &FixedScorer(0.9)).unwrap_err();
        assert!(matches!(err, GrantScoutError::Parse { .. }));
    }

    #[test]
    fn fixture_fenced_response() {
        let raw = std::fs::read_to_string("../../../fixtures/responses/fenced.txt")
            .expect("read fixture");
        let batch = parse_response(&raw, &RandomScorer).unwrap();
        assert_eq!(batch.grants.len(), 5);
        assert_eq!(batch.grants[0].program_title, "Community Solar Access Program");
    }

    #[test]
    fn fixture_prose_response() {
        let raw = std::fs::read_to_string("../../../fixtures/responses/prose.txt")
            .expect("read fixture");
        let batch = parse_response(&raw, &RandomScorer).unwrap();
        assert_eq!(batch.grants.len(), 3);
        assert_eq!(batch.grants[2].status, GrantStatus::Unknown);
    }

    #[test]
    fn missing_brackets_is_parse_error() {
        for raw in [
            "",
            "No opportunities found.",
            "{\"a\": 1}",
            "only ] closing",
            "only [ opening",
        ] {
            let err = parse_response(raw, &RandomScorer).unwrap_err();
            assert!(matches!(err, GrantScoutError::Parse { .. }), "{raw:?}: {err}");
        }
    }

    #[test]
    fn reversed_brackets_is_parse_error() {
        let err = parse_response("] nothing here [", &RandomScorer).unwrap_err();
        assert!(matches!(err, GrantScoutError::Parse { .. }));
    }

    #[test]
    fn invalid_json_between_brackets_is_parse_error() {
        let err = parse_response("[{\"program_title\": \"A\",}]", &RandomScorer).unwrap_err();
        assert!(matches!(err, GrantScoutError::Parse { .. }));
        assert!(err.to_string().contains("not a valid JSON array"));
    }

    #[test]
    fn every_score_is_in_range() {
        let raw = std::fs::read_to_string("../../../fixtures/responses/fenced.txt")
            .expect("read fixture");
        for _ in 0..50 {
            let batch = parse_response(&raw, &RandomScorer).unwrap();
            for grant in &batch.grants {
                assert!(grant.confidence_score >= MIN_CONFIDENCE);
                assert!(grant.confidence_score < MAX_CONFIDENCE);
            }
        }
    }

    #[test]
    fn ids_are_unique_within_and_across_parses() {
        let a = parse_response(TWO_GRANTS, &RandomScorer).unwrap();
        let b = parse_response(TWO_GRANTS, &RandomScorer).unwrap();
        let mut ids: Vec<_> = a.grants.iter().chain(&b.grants).map(|g| g.id.clone()).collect();
        ids.sort_by_key(|id| id.0);
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn coerces_mistyped_and_missing_fields() {
        let raw = r#"[
          {"program_title": "Heritage Fund", "funding_amount": 50000, "status": "open",
           "agency_name": null, "application_deadline": "  "},
          {"program_title": "   "},
          "not an object",
          {"agency_name": "No title here"},
          {"program_title": 2026, "status": ["OPEN"], "eligibility_criteria": {"who": "anyone"}}
        ]"#;
        let batch = parse_response(raw, &FixedScorer(0.91)).unwrap();
        assert_eq!(batch.rejected, 3);
        assert_eq!(batch.grants.len(), 2);

        let heritage = &batch.grants[0];
        assert_eq!(heritage.funding_amount.as_deref(), Some("50000"));
        assert_eq!(heritage.status, GrantStatus::Open);
        assert_eq!(heritage.agency_name, "");
        assert!(heritage.application_deadline.is_none());
        assert_eq!(heritage.official_application_link, "");

        let numeric = &batch.grants[1];
        assert_eq!(numeric.program_title, "2026");
        assert_eq!(numeric.status, GrantStatus::Unknown);
        assert_eq!(numeric.eligibility_criteria, "");
    }

    #[test]
    fn empty_array_yields_no_grants() {
        let batch = parse_response("```json\n[]\n```", &RandomScorer).unwrap();
        assert!(batch.grants.is_empty());
        assert_eq!(batch.rejected, 0);
    }

    #[test]
    fn recover_slices_inclusive_brackets() {
        assert_eq!(recover_json_array("noise [1, [2]] tail").unwrap(), "[1, [2]]");
    }
}
