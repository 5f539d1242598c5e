//! Best-effort parsing of free-form model output
//!
//! The model is asked for a bare JSON object but is not bound to comply: it
//! may wrap the object in prose or code fences, or answer in plain text.

use crate::normalize::{fold, normalize};
use crate::tables::{TARGET_COUNTRY, TARGET_COUNTRY_STEM, UNSPECIFIED};
use crate::types::{Confidence, NationalityResult};

/// Field names of the answer shape requested in the prompt.
pub const FIELD_IS_TARGET: &str = "es_argentino";
pub const FIELD_NAME: &str = "nacionalidad_normalizada";
pub const FIELD_CONFIDENCE: &str = "confianza";

/// Parse the span from the first `{` to the last `}` as a JSON object.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&text[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

/// Read the three required fields; `None` if any is missing or mistyped.
fn structured_result(value: &serde_json::Value) -> Option<NationalityResult> {
    let is_target = value.get(FIELD_IS_TARGET)?.as_bool()?;
    let name = normalize(value.get(FIELD_NAME)?.as_str()?);
    if name.is_empty() {
        return None;
    }
    let confidence = Confidence::parse(value.get(FIELD_CONFIDENCE)?.as_str()?)
        .unwrap_or(Confidence::Low);
    Some(NationalityResult::new(is_target, name, confidence))
}

/// Turn a raw model answer into a result. Never fails.
///
/// A well-formed embedded object is taken as is. Otherwise: if the answer
/// mentions the target country anywhere, it is a medium-confidence positive;
/// if not, a low-confidence negative labelled with the declared text.
pub fn parse_nationality_response(raw: &str, declared: &str) -> NationalityResult {
    if let Some(result) = extract_json(raw).as_ref().and_then(structured_result) {
        return result;
    }

    // The field name itself contains the stem; only values count.
    if fold(raw)
        .replace(FIELD_IS_TARGET, "")
        .contains(TARGET_COUNTRY_STEM)
    {
        return NationalityResult::new(true, TARGET_COUNTRY, Confidence::Medium);
    }

    let declared = normalize(declared);
    let label = if declared.is_empty() {
        UNSPECIFIED.to_string()
    } else {
        declared
    };
    NationalityResult::new(false, label, Confidence::Low)
}
