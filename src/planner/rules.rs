use super::{Action, Plan, PlanGenerator, PlanRequest};
use crate::error::PlanError;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

static PRICE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?\s*(\d+(?:,\d{3})*(?:\.\d+)?)").expect("valid price regex")
});
static PRICE_FLOOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(over|above|more than|minimum|min|at\s*least)\b").expect("valid floor regex")
});
static PRICE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:under|below|less than|at\s*most|maximum|max|over|above|more than|minimum|min|at\s*least|between|for|around|budget(?:\s+of)?)\s*)?\$\s*\d+(?:,\d{3})*(?:\.\d+)?(?:\s*(?:to|-|and)\s*\$?\s*\d+(?:,\d{3})*(?:\.\d+)?)?",
    )
    .expect("valid price phrase regex")
});
static BARE_PRICE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:under|below|less than|at\s*most|maximum|max|over|above|more than|minimum|min|at\s*least)\s+\d+(?:,\d{3})*(?:\.\d+)?(?:\s*(?:dollars|bucks|usd))?",
    )
    .expect("valid bare price regex")
});
static SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:size\s+([a-z0-9.]+)|(xx?s|xx?l|xxxl|x-large|extra large|small|medium|large))\b",
    )
    .expect("valid size regex")
});
static COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(black|white|red|blue|navy|green|yellow|orange|purple|pink|brown|gray|grey|silver|gold|beige|tan)\b",
    )
    .expect("valid color regex")
});
static FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:(?:can you\s+)?(?:find|get|show|search for|look for)(?:\s+me)?|i(?:'m| am)\s+looking for|looking for|i\s+(?:need|want)|we\s+need)\s+(?:some\s+|a\s+|an\s+)?",
    )
    .expect("valid filler regex")
});

const OUTREACH_PHRASES: &[&str] = &[
    "reach out",
    "get quotes",
    "get a quote",
    "request quotes",
    "contact vendors",
    "contact suppliers",
];
const REFRESH_PHRASES: &[&str] = &[
    "search again",
    "refresh",
    "more results",
    "more options",
    "try again",
];
const REFINEMENT_MARKERS: &[&str] = &[
    "make it",
    "make them",
    "actually",
    "instead",
    "change",
    "only",
    "cheaper",
    "in ",
    "but ",
];

/// Minimum/maximum price read out of free text, plus the text with the
/// price wording removed.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceConstraint {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub remaining: String,
}

/// Bounds come only from price phrases ("under $300", "$50 to $100",
/// "over 200 dollars"); other numbers in the text are ignored. Two numbers
/// inside one phrase give a range; a single number is a floor when its cue
/// is over/above/at least/min, otherwise a ceiling.
pub fn parse_price_constraint(text: &str) -> PriceConstraint {
    let mut min_price = None;
    let mut max_price = None;

    let phrases = PRICE_PHRASE
        .find_iter(text)
        .chain(BARE_PRICE_PHRASE.find_iter(text));
    for phrase in phrases {
        let phrase = phrase.as_str();
        let numbers: Vec<f64> = PRICE_NUMBER
            .captures_iter(phrase)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().replace(',', "").parse().ok())
            .collect();
        match numbers.as_slice() {
            [a, b, ..] => {
                min_price = min_price.or(Some(a.min(*b)));
                max_price = max_price.or(Some(a.max(*b)));
            }
            [n] if PRICE_FLOOR.is_match(phrase) => min_price = min_price.or(Some(*n)),
            [n] => max_price = max_price.or(Some(*n)),
            [] => {}
        }
    }

    if let (Some(min), Some(max)) = (min_price, max_price)
        && min > max
    {
        (min_price, max_price) = (Some(max), Some(min));
    }

    let stripped = PRICE_PHRASE.replace_all(text, " ");
    let stripped = BARE_PRICE_PHRASE.replace_all(&stripped, " ");
    PriceConstraint {
        min_price,
        max_price,
        remaining: collapse_whitespace(&stripped),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace())
        .to_string()
}

fn normalize_size(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "small" => "S".into(),
        "medium" => "M".into(),
        "large" => "L".into(),
        "x-large" | "extra large" => "XL".into(),
        other => other.to_uppercase(),
    }
}

/// Constraints the rules can read from one utterance, and the utterance with
/// those phrases removed.
fn extract_constraints(text: &str) -> (BTreeMap<String, Value>, String) {
    let mut constraints = BTreeMap::new();

    let mut working = text.to_string();
    if let Some(caps) = SIZE.captures(&working) {
        let raw = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(raw) = raw {
            constraints.insert("size".to_string(), json!(normalize_size(raw)));
        }
        working = SIZE.replace(&working, " ").into_owned();
    }
    if let Some(m) = COLOR.find(&working) {
        constraints.insert("color".to_string(), json!(m.as_str().to_lowercase()));
    }

    let price = parse_price_constraint(&working);
    if let Some(min) = price.min_price {
        constraints.insert("min_price".to_string(), json!(min));
    }
    if let Some(max) = price.max_price {
        constraints.insert("max_price".to_string(), json!(max));
    }
    working = price.remaining;

    (constraints, collapse_whitespace(&working))
}

fn title_case_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Deterministic planner used when the LLM is unavailable or fails.
#[derive(Debug, Clone)]
pub struct RuleBasedPlanner {
    default_vendor_limit: u32,
}

impl RuleBasedPlanner {
    pub fn new(default_vendor_limit: u32) -> Self {
        Self {
            default_vendor_limit,
        }
    }

    pub fn plan(&self, request: &PlanRequest) -> Plan {
        let text = request.latest_user_message().unwrap_or_default();
        if text.is_empty() {
            return Plan {
                assistant_message: "What are you looking for? Tell me the item and any budget, \
                                    size or color preferences."
                    .into(),
                actions: Vec::new(),
            };
        }
        let lower = text.to_lowercase();

        if let Some(row_id) = request.active_row_id {
            if contains_any(&lower, OUTREACH_PHRASES) {
                let category = request
                    .active_row_category
                    .clone()
                    .unwrap_or_else(|| "service".into());
                return Plan {
                    assistant_message: format!("I'll reach out to {category} vendors for quotes."),
                    actions: vec![Action::VendorOutreach {
                        row_id: Some(row_id),
                        category,
                        vendor_limit: Some(self.default_vendor_limit),
                    }],
                };
            }

            let active_title = request
                .active_row_title
                .clone()
                .filter(|t| !t.trim().is_empty());

            if contains_any(&lower, REFRESH_PHRASES) {
                let query = active_title.unwrap_or_else(|| text.to_string());
                return Plan {
                    assistant_message: format!("Refreshing results for {query}."),
                    actions: vec![Action::Search {
                        row_id: Some(row_id),
                        query,
                        providers: None,
                    }],
                };
            }

            let (constraints, _) = extract_constraints(text);
            let refining = REFINEMENT_MARKERS.iter().any(|m| lower.starts_with(m))
                || contains_any(&lower, &["make it", "instead", "cheaper"]);
            if refining || !constraints.is_empty() {
                let search_query = active_title.as_deref().map(|title| {
                    let mut query = title.to_string();
                    for key in ["color", "size"] {
                        if let Some(Value::String(value)) = constraints.get(key) {
                            query.push(' ');
                            query.push_str(value);
                        }
                    }
                    query
                });
                return Plan {
                    assistant_message: "Got it, updating your request.".into(),
                    actions: vec![Action::UpdateRow {
                        row_id: Some(row_id),
                        title: None,
                        constraints: (!constraints.is_empty()).then_some(constraints),
                        search_query,
                        providers: None,
                    }],
                };
            }
        }

        let (constraints, remaining) = extract_constraints(text);
        let cleaned = FILLER.replace(&remaining, "");
        let cleaned = collapse_whitespace(&cleaned);
        let title = title_case_first(if cleaned.is_empty() { text } else { cleaned.as_str() });

        Plan {
            assistant_message: format!("Searching for {title}."),
            actions: vec![Action::CreateRow {
                search_query: Some(title.clone()),
                title,
                constraints,
                providers: None,
            }],
        }
    }
}

impl PlanGenerator for RuleBasedPlanner {
    fn name(&self) -> &str {
        "rules"
    }

    fn generate<'a>(
        &'a self,
        request: &'a PlanRequest,
        _cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Plan, PlanError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.plan(request)) })
    }
}
