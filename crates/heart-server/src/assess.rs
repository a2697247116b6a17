//! Turns a raw assistant reply into the displayed assessment.
//!
//! raw reply → strip references → sections (JSON answer or headed text) → strip each
//! body → normalize "Recommendation" → reassemble full text.
use heart_common::sections::{
    SectionMap, CONSULT_OTHER_TEAMS, NEXT_STEPS, RATIONALE, RECOMMENDATION,
};
use serde::Serialize;
use serde_json::Value;

use crate::recommendation::normalize_recommendation;
use crate::references::{ensure_terminal_punctuation, strip_references};
use crate::sections::sectionize_or_fallback;

/// JSON keys the assistant may answer with, per canonical section.
const JSON_SECTION_KEYS: [(&str, &[&str]); 4] = [
    (RECOMMENDATION, &["recommendation"]),
    (RATIONALE, &["rationale"]),
    (NEXT_STEPS, &["nextSteps", "next_steps"]),
    (CONSULT_OTHER_TEAMS, &["consultOtherTeams", "consult_other_teams"]),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessedResponse {
    pub text: String,
    pub sections: SectionMap,
}

pub fn assessment_prompt(clinical_context: &str, clinical_question: &str) -> String {
    format!("Clinical Context: {clinical_context}\n\nClinical Question: {clinical_question}")
}

pub fn assess_reply(raw: &str) -> AssessedResponse {
    let stripped = strip_references(raw);
    let mut sections = sections_from_json(&stripped)
        .unwrap_or_else(|| sectionize_or_fallback(&stripped));

    for body in sections.values_mut() {
        *body = strip_references(body);
    }
    if let Some(recommendation) = sections.get_mut(RECOMMENDATION) {
        *recommendation = normalize_recommendation(recommendation);
    }

    let text = if sections.is_empty() {
        stripped
    } else {
        reassemble(&sections)
    };
    AssessedResponse { text, sections }
}

/// Sections from a reply that is a JSON object keyed like `recommendation`/`nextSteps`.
///
/// `None` unless the text is a JSON object with at least one recognised string field.
pub fn sections_from_json(text: &str) -> Option<SectionMap> {
    let Value::Object(object) = serde_json::from_str::<Value>(text).ok()? else {
        return None;
    };
    sections_from_object(&object)
}

fn sections_from_object(object: &serde_json::Map<String, Value>) -> Option<SectionMap> {
    let sections: SectionMap = JSON_SECTION_KEYS
        .iter()
        .filter_map(|(name, keys)| {
            keys.iter()
                .find_map(|k| object.get(*k).and_then(Value::as_str))
                .map(|body| (name.to_string(), body.trim().to_string()))
        })
        .collect();
    (!sections.is_empty()).then_some(sections)
}

pub fn reassemble(sections: &SectionMap) -> String {
    sections
        .iter()
        .map(|(name, body)| {
            if body.is_empty() {
                format!("{name}:")
            } else {
                format!("{name}:\n{body}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Post-processing for the single-message chat proxy.
pub fn chat_reply(raw: &str) -> String {
    ensure_terminal_punctuation(&strip_references(raw))
}

/// Text and sections for an externally supplied response being logged as-is.
///
/// Strings are sectionized; objects use the JSON section keys. No normalization is
/// applied since the response was already shown to the user.
pub fn logged_response(value: &Value) -> AssessedResponse {
    match value {
        Value::String(text) => {
            let text = strip_references(text);
            let sections = sectionize_or_fallback(&text);
            AssessedResponse { text, sections }
        }
        Value::Object(object) => match sections_from_object(object) {
            Some(sections) => AssessedResponse {
                text: reassemble(&sections),
                sections,
            },
            None => AssessedResponse {
                text: value.to_string(),
                sections: SectionMap::new(),
            },
        },
        Value::Null => AssessedResponse {
            text: String::new(),
            sections: SectionMap::new(),
        },
        other => AssessedResponse {
            text: other.to_string(),
            sections: SectionMap::new(),
        },
    }
}
