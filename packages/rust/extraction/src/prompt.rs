//! Extraction prompt construction.

use grantscout_shared::SearchConfig;

/// Fields the provider must emit for every opportunity, in output order.
pub const GRANT_FIELDS: &[&str] = &[
    "agency_name",
    "program_title",
    "funding_type",
    "brief_description",
    "eligibility_criteria",
    "application_deadline",
    "funding_amount",
    "geographic_scope",
    "official_application_link",
    "status",
];

/// Minimum number of opportunities the prompt asks for.
pub const MIN_RESULTS: usize = 5;

/// Upper end of the requested result range.
pub const MAX_RESULTS: usize = 8;

/// Build the natural-language extraction instruction for one run.
///
/// Keywords are listed in the order given.
pub fn build_prompt(search: &SearchConfig) -> String {
    let keywords = search
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let year = search.year;

    format!(
        "You are a grant research analyst. Use Google Search to find currently available \
funding opportunities for the year {year} related to these keywords: {keywords}.

Requirements:
1. Use live search results. Do not rely on memory alone.
2. Return at least {MIN_RESULTS} and up to {MAX_RESULTS} distinct opportunities. \
Exclude any whose application deadline has already passed.
3. Respond with a strict JSON array and nothing else. Each element must be an object \
with exactly these fields:
{schema}
4. Do not wrap the output in markdown code fences and do not add commentary.
5. Take official_application_link from the search results you used. Never invent a URL.
6. Use null for application_deadline or funding_amount when unknown. \
status must be one of \"OPEN\", \"UPCOMING\" or \"UNKNOWN\".",
        schema = field_schema(),
    )
}

fn field_schema() -> String {
    GRANT_FIELDS
        .iter()
        .map(|field| {
            let ty = match *field {
                "application_deadline" | "funding_amount" => "string or null",
                "official_application_link" => "string (URL)",
                "status" => "\"OPEN\" | \"UPCOMING\" | \"UNKNOWN\"",
                _ => "string",
            };
            format!("   - {field}: {ty}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
