//! Metamodel loading.
//!
//! The metamodel is a YAML rule table describing every need type known to the
//! documentation build: which fields and links are mandatory or optional and
//! which regex each value has to satisfy.
//!
//! ```yaml
//! needs_types:
//!   tool_req:
//!     title: Tool Requirement
//!     prefix: tool_req__
//!     tags: [requirement]
//!     mandatory_options:
//!       status: ^(valid|draft)$
//!     optional_links:
//!       satisfies: ^gd_req__.+$, stkh_req
//! prohibited_words_checks:
//!   title_check:
//!     types: [requirement]
//!     title: [shall, must]
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{DocsError, Result};

/// Ordered `field -> value` table as written in the metamodel.
pub type ConstraintMap = IndexMap<String, String>;

/// A single need type (directive) of the metamodel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NeedType {
    /// Directive name, also the value of a need's `type` field.
    pub directive: String,
    pub title: String,
    pub prefix: String,
    /// Classification tags of the type itself (e.g. `requirement`).
    pub tags: Vec<String>,
    pub mandatory_options: ConstraintMap,
    pub optional_options: ConstraintMap,
    pub mandatory_links: ConstraintMap,
    pub optional_links: ConstraintMap,
}

impl NeedType {
    /// Create an unconstrained need type.
    #[must_use]
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_mandatory_option(mut self, field: &str, pattern: &str) -> Self {
        self.mandatory_options.insert(field.into(), pattern.into());
        self
    }

    #[must_use]
    pub fn with_optional_option(mut self, field: &str, pattern: &str) -> Self {
        self.optional_options.insert(field.into(), pattern.into());
        self
    }

    #[must_use]
    pub fn with_mandatory_link(mut self, field: &str, value: &str) -> Self {
        self.mandatory_links.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_optional_link(mut self, field: &str, value: &str) -> Self {
        self.optional_links.insert(field.into(), value.into());
        self
    }

    /// True when at least one field or link constraint is declared.
    #[must_use]
    pub fn has_constraints(&self) -> bool {
        !(self.mandatory_options.is_empty()
            && self.optional_options.is_empty()
            && self.mandatory_links.is_empty()
            && self.optional_links.is_empty())
    }
}

/// Forbidden ("weak") words per need option.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProhibitedWordCheck {
    pub name: String,
    /// Need type tags this check is restricted to. Empty means every need.
    pub types: Vec<String>,
    /// `option -> forbidden words`
    pub option_check: IndexMap<String, Vec<String>>,
}

/// The parsed metamodel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaModel {
    pub needs_types: Vec<NeedType>,
    pub prohibited_words_checks: Vec<ProhibitedWordCheck>,
}

#[derive(Deserialize)]
struct RawMetaModel {
    #[serde(default)]
    needs_types: IndexMap<String, RawNeedType>,
    #[serde(default)]
    prohibited_words_checks: IndexMap<String, IndexMap<String, serde_yaml::Value>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawNeedType {
    title: String,
    prefix: String,
    tags: Vec<String>,
    #[serde(deserialize_with = "scalar_map")]
    mandatory_options: ConstraintMap,
    #[serde(deserialize_with = "scalar_map")]
    optional_options: ConstraintMap,
    #[serde(deserialize_with = "scalar_map")]
    mandatory_links: ConstraintMap,
    #[serde(deserialize_with = "scalar_map")]
    optional_links: ConstraintMap,
}

/// Accept numbers and booleans next to strings, and `~` for an empty table.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<ConstraintMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    let mut map = ConstraintMap::new();
    for (field, value) in raw.unwrap_or_default() {
        let text = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Null => String::new(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "field '{field}' must be a scalar, got {other:?}"
                )))
            }
        };
        map.insert(field, text);
    }
    Ok(map)
}

fn word_list(value: serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        serde_yaml::Value::String(s) => s
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

impl MetaModel {
    /// Load the metamodel from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocsError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let model = Self::parse(&content).map_err(|source| DocsError::Metamodel {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Loaded metamodel {} with {} need types",
            path.display(),
            model.needs_types.len()
        );
        Ok(model)
    }

    /// Parse a metamodel from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::parse(content).map_err(|source| DocsError::Metamodel {
            path: "<inline>".into(),
            source,
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let raw: RawMetaModel = serde_yaml::from_str(content)?;

        let needs_types = raw
            .needs_types
            .into_iter()
            .map(|(directive, body)| NeedType {
                directive,
                title: body.title,
                prefix: body.prefix,
                tags: body.tags,
                mandatory_options: body.mandatory_options,
                optional_options: body.optional_options,
                mandatory_links: body.mandatory_links,
                optional_links: body.optional_links,
            })
            .collect();

        let prohibited_words_checks = raw
            .prohibited_words_checks
            .into_iter()
            .map(|(name, mut body)| {
                let types = body.shift_remove("types").map(word_list).unwrap_or_default();
                let option_check = body
                    .into_iter()
                    .map(|(option, words)| (option, word_list(words)))
                    .collect();
                ProhibitedWordCheck {
                    name,
                    types,
                    option_check,
                }
            })
            .collect();

        Ok(Self {
            needs_types,
            prohibited_words_checks,
        })
    }

    /// Look up a need type by its directive name.
    #[must_use]
    pub fn need_type(&self, directive: &str) -> Option<&NeedType> {
        self.needs_types.iter().find(|t| t.directive == directive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METAMODEL: &str = r#"
needs_types:
  tool_req:
    title: Tool Requirement
    prefix: tool_req__
    tags: [requirement]
    mandatory_options:
      status: ^(valid|draft)$
      id: ^tool_req__.+$
    optional_links:
      satisfies: ^gd_req__.+$, stkh_req
  info:
    title: Info
    prefix: INF_
prohibited_words_checks:
  title_check:
    types: [requirement]
    title: [shall, must]
  content_check:
    content: [just, about]
"#;

    #[test]
    fn test_parse_need_types_in_order() {
        let model = MetaModel::from_yaml_str(METAMODEL).unwrap();
        let directives: Vec<_> = model.needs_types.iter().map(|t| t.directive.as_str()).collect();
        assert_eq!(directives, vec!["tool_req", "info"]);

        let req = model.need_type("tool_req").unwrap();
        assert_eq!(req.title, "Tool Requirement");
        assert_eq!(req.tags, vec!["requirement"]);
        let fields: Vec<_> = req.mandatory_options.keys().collect();
        assert_eq!(fields, vec!["status", "id"]);
        assert_eq!(req.optional_links["satisfies"], "^gd_req__.+$, stkh_req");
    }

    #[test]
    fn test_type_without_constraints() {
        let model = MetaModel::from_yaml_str(METAMODEL).unwrap();
        let info = model.need_type("info").unwrap();
        assert!(!info.has_constraints());
        assert!(model.need_type("tool_req").unwrap().has_constraints());
    }

    #[test]
    fn test_prohibited_words_checks() {
        let model = MetaModel::from_yaml_str(METAMODEL).unwrap();
        assert_eq!(model.prohibited_words_checks.len(), 2);

        let title = &model.prohibited_words_checks[0];
        assert_eq!(title.name, "title_check");
        assert_eq!(title.types, vec!["requirement"]);
        assert_eq!(title.option_check["title"], vec!["shall", "must"]);
        assert!(!title.option_check.contains_key("types"));

        let content = &model.prohibited_words_checks[1];
        assert!(content.types.is_empty());
    }

    #[test]
    fn test_scalar_values_are_stringified() {
        let yaml = r#"
needs_types:
  doc:
    mandatory_options:
      version: 1
      safety: true
      empty: ~
"#;
        let model = MetaModel::from_yaml_str(yaml).unwrap();
        let doc = model.need_type("doc").unwrap();
        assert_eq!(doc.mandatory_options["version"], "1");
        assert_eq!(doc.mandatory_options["safety"], "true");
        assert_eq!(doc.mandatory_options["empty"], "");
    }

    #[test]
    fn test_null_constraint_table() {
        let yaml = "needs_types:\n  doc:\n    optional_links:\n";
        let model = MetaModel::from_yaml_str(yaml).unwrap();
        assert!(!model.need_type("doc").unwrap().has_constraints());
    }

    #[test]
    fn test_invalid_yaml_is_metamodel_error() {
        let err = MetaModel::from_yaml_str("needs_types: [unclosed").unwrap_err();
        assert!(matches!(err, DocsError::Metamodel { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = MetaModel::load(Path::new("/nonexistent/metamodel.yaml")).unwrap_err();
        assert!(matches!(err, DocsError::MissingFile { .. }));
    }

    #[test]
    fn test_builder() {
        let t = NeedType::new("spec")
            .with_prefix("SPEC_")
            .with_mandatory_option("status", "^valid$");
        assert_eq!(t.directive, "spec");
        assert!(t.has_constraints());
    }
}
