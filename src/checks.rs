//! Local checks run against every need.
//!
//! These complement the generated schemas with rules that cannot be
//! expressed as JSON Schema: ID length, the feature part of an ID matching
//! the document path, and forbidden ("weak") words.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::metamodel::{MetaModel, ProhibitedWordCheck};
use crate::needs::{Need, Needs};

/// Hard limit for need IDs.
pub const MAX_ID_LENGTH: usize = 45;

/// A finding of a local check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckWarning {
    pub need_id: String,
    /// The option the finding is about, if any.
    pub option: Option<String>,
    pub message: String,
}

impl CheckWarning {
    fn for_option(need: &Need, option: &str, message: String) -> Self {
        Self {
            need_id: need.id.clone(),
            option: Some(option.to_string()),
            message,
        }
    }

    fn for_need(need: &Need, message: String) -> Self {
        Self {
            need_id: need.id.clone(),
            option: None,
            message,
        }
    }
}

impl fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.option {
            Some(option) => write!(f, "{}.{}: {}", self.need_id, option, self.message),
            None => write!(f, "{}: {}", self.need_id, self.message),
        }
    }
}

/// Warn when the ID is longer than [`MAX_ID_LENGTH`].
#[must_use]
pub fn check_id_length(need: &Need) -> Option<CheckWarning> {
    let length = need.id.chars().count();
    (length > MAX_ID_LENGTH).then(|| {
        CheckWarning::for_option(
            need,
            "id",
            format!(
                "exceeds the maximum allowed length of {MAX_ID_LENGTH} characters \
                 (current length: {length})."
            ),
        )
    })
}

/// Warn when the feature part of `<type>__<feature>__<title>` does not match
/// the document location.
///
/// The directory of the docname (or the docname itself for top level
/// documents) must contain one of the feature's `_`/`-` separated parts, or
/// the initials of a multi-part feature. A single-part feature has no
/// initials, so it always passes.
#[must_use]
pub fn check_id_contains_feature(need: &Need) -> Option<CheckWarning> {
    let parts: Vec<&str> = need.id.split("__").collect();
    if parts.len() != 3 || need.id.starts_with("stkh_req__") {
        return None;
    }

    let feature_parts: Vec<&str> = parts[1].split(['_', '-']).collect();

    let docname = match need.docname.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => need.docname.as_str(),
    };
    let location = docname.to_lowercase();

    let found_part = feature_parts
        .iter()
        .any(|part| location.contains(&part.to_lowercase()));

    let initials: String = if feature_parts.len() > 1 {
        feature_parts
            .iter()
            .filter_map(|part| part.chars().next())
            .flat_map(char::to_lowercase)
            .collect()
    } else {
        String::new()
    };
    let found_initials = location.contains(initials.as_str());

    if found_part || found_initials {
        return None;
    }

    let listed = feature_parts
        .iter()
        .map(|p| format!("'{p}'"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(CheckWarning::for_option(
        need,
        "id",
        format!(
            "Featurepart '[{listed}]' not in path '{docname}' or abbreviation not ok, \
             expected: '{initials}'."
        ),
    ))
}

fn check_options_for_prohibited_words(
    check: &ProhibitedWordCheck,
    need: &Need,
) -> Vec<CheckWarning> {
    let mut warnings = Vec::new();
    for (option, forbidden) in &check.option_check {
        let Some(value) = need.option(option) else {
            continue;
        };
        for word in value.split_whitespace() {
            if forbidden.iter().any(|f| f == word) {
                warnings.push(CheckWarning::for_need(
                    need,
                    format!(
                        "contains a weak word: `{word}` in option: `{option}`. \
                         Please revise the wording."
                    ),
                ));
            }
        }
    }
    warnings
}

/// Apply every prohibited word check relevant for the need.
///
/// A check restricted by `types` only applies to needs whose need type
/// carries one of those tags.
#[must_use]
pub fn check_prohibited_words(metamodel: &MetaModel, need: &Need) -> Vec<CheckWarning> {
    let type_tags: &[String] = metamodel
        .need_type(&need.need_type)
        .map(|t| t.tags.as_slice())
        .unwrap_or_default();

    metamodel
        .prohibited_words_checks
        .iter()
        .filter(|check| {
            check.types.is_empty() || check.types.iter().any(|tag| type_tags.contains(tag))
        })
        .flat_map(|check| check_options_for_prohibited_words(check, need))
        .collect()
}

/// Run all local checks over all needs.
#[must_use]
pub fn run_local_checks(metamodel: &MetaModel, needs: &Needs) -> Vec<CheckWarning> {
    let mut warnings = Vec::new();
    for need in needs.values() {
        if metamodel.need_type(&need.need_type).is_none() {
            debug!("Need {} has unknown type '{}'", need.id, need.need_type);
        }
        warnings.extend(check_id_length(need));
        warnings.extend(check_id_contains_feature(need));
        warnings.extend(check_prohibited_words(metamodel, need));
    }

    for warning in &warnings {
        warn!("{}", warning);
    }
    warnings
}
