//! Metamodel to JSON Schema compiler.
//!
//! Every constrained need type of the [`MetaModel`] becomes one schema entry
//! that the documentation host evaluates against each need:
//!
//! - `select` matches needs whose `type` equals the directive name.
//! - `validate.local` checks the need's own properties: regex patterns for
//!   fields, presence of mandatory fields and links.
//! - `validate.network` checks the `type` of linked needs. It is only emitted
//!   when [`SchemaOptions::network_validation`] is set.
//!
//! # Link values
//!
//! A link constraint value is a comma separated list. Entries starting with
//! `^` are regexes on the linked IDs, everything else names the type the
//! linked need must have:
//!
//! ```text
//! satisfies: ^logic_arc_int(_op)*__.+$, comp
//!            └──────── regex ────────┘  └ target type
//! ```
//!
//! # Severity
//!
//! All entries are emitted with severity `violation`. The two rule forms that
//! would raise findings the existing checks do not already report, link-ID
//! regexes and linked-need types, stay disabled until explicitly enabled via
//! [`SchemaOptions`]. Enabling them in a consumer build turns previously
//! accepted documentation into failing builds.
//!
//! # Example
//!
//! ```rust
//! use docs_as_code::metamodel::{MetaModel, NeedType};
//! use docs_as_code::schema::{compile, SchemaOptions};
//!
//! let model = MetaModel {
//!     needs_types: vec![NeedType::new("req").with_mandatory_option("status", "^valid$")],
//!     ..Default::default()
//! };
//! let defs = compile(&model, &SchemaOptions::default());
//! assert_eq!(defs.schemas[0].id, "need-type-req");
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::metamodel::{ConstraintMap, MetaModel, NeedType};

/// Fields whose values are lists in the host (e.g. `tags: [safety, security]`).
pub const SN_ARRAY_FIELDS: &[&str] = &["tags", "sections"];

/// Fields never emitted into a schema.
pub const IGNORE_FIELDS: &[&str] = &["content"];

/// File name the schema definitions are written to.
pub const SCHEMAS_FILE_NAME: &str = "schemas.json";

/// Host configuration key that points at [`SCHEMAS_FILE_NAME`].
pub const SCHEMAS_CONFIG_KEY: &str = "needs_schema_definitions_from_json";

const SCHEMA_MESSAGE: &str = "Need does not conform to S-CORE metamodel";

// ============================================================================
// Options
// ============================================================================

/// Opt-in switches for the stricter rule forms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Emit `validate.network` entries checking the type of linked needs.
    pub network_validation: bool,
    /// Emit `items.pattern` for regex link constraints.
    pub link_id_patterns: bool,
}

// ============================================================================
// Schema document model
// ============================================================================

/// JSON Schema primitive types used by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Array,
}

/// A JSON Schema fragment for one property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<JsonType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u32>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub constant: Option<String>,
}

impl PropertySchema {
    fn array() -> Self {
        Self {
            kind: Some(JsonType::Array),
            ..Default::default()
        }
    }
}

/// Severity the host attaches to a failing schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

/// `select` block: which needs a schema applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selector {
    pub properties: IndexMap<String, PropertySchema>,
    pub required: Vec<String>,
}

/// Validation of a need's own properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalValidator {
    pub properties: IndexMap<String, PropertySchema>,
    pub required: Vec<String>,
}

/// Validation applied to every need reached through one link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkValidator {
    pub items: LinkedNeedValidator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedNeedValidator {
    pub local: LinkedNeedProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedNeedProperties {
    pub properties: IndexMap<String, PropertySchema>,
}

/// `validate` block of a schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validate {
    pub local: LocalValidator,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub network: IndexMap<String, LinkValidator>,
}

/// One schema entry, generated per need type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeedTypeSchema {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub select: Selector,
    pub validate: Validate,
}

/// Root document of `schemas.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDefinitions {
    pub schemas: Vec<NeedTypeSchema>,
}

/// Where the schema was written and how the host should pick it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaOutput {
    pub path: PathBuf,
    pub config_key: &'static str,
    pub config_value: &'static str,
    pub schema_count: usize,
}

// ============================================================================
// Pattern helpers
// ============================================================================

/// Schema validating a string against a regex.
#[must_use]
pub fn pattern_schema(pattern: &str) -> PropertySchema {
    PropertySchema {
        kind: Some(JsonType::String),
        pattern: Some(pattern.to_string()),
        ..Default::default()
    }
}

/// Schema validating an array whose items all match a regex.
#[must_use]
pub fn array_pattern_schema(pattern: &str) -> PropertySchema {
    PropertySchema {
        kind: Some(JsonType::Array),
        items: Some(Box::new(pattern_schema(pattern))),
        ..Default::default()
    }
}

/// Array schema for list valued fields, string schema for everything else.
#[must_use]
pub fn field_pattern_schema(field: &str, pattern: &str) -> PropertySchema {
    if SN_ARRAY_FIELDS.contains(&field) {
        array_pattern_schema(pattern)
    } else {
        pattern_schema(pattern)
    }
}

fn is_ignored(field: &str) -> bool {
    IGNORE_FIELDS.contains(&field)
}

// ============================================================================
// Compiler
// ============================================================================

/// Split link constraints into regex constraints and target type constraints.
///
/// Returns `(regexes, targets)`, both keyed by link field. A field may end up
/// in both maps. Later values replace earlier ones; a second regex for the
/// same field is logged as an error because only one can be kept.
pub fn classify_links(
    links: &ConstraintMap,
    type_name: &str,
    mandatory: bool,
) -> (IndexMap<String, String>, IndexMap<String, String>) {
    let kind = if mandatory { "mandatory" } else { "optional" };
    let mut regexes = IndexMap::new();
    let mut targets = IndexMap::new();

    for (field, value) in links {
        for link_value in value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            if link_value.starts_with('^') {
                if regexes.contains_key(field) {
                    error!(
                        "Multiple regex patterns for {} link field '{}' in need type '{}'. \
                         Only the last one will be used in the schema.",
                        kind, field, type_name
                    );
                }
                regexes.insert(field.clone(), link_value.to_string());
            } else {
                targets.insert(field.clone(), link_value.to_string());
            }
        }
    }

    (regexes, targets)
}

/// Build the validator for a need's own properties.
#[must_use]
pub fn build_local_validator(
    mandatory_fields: &ConstraintMap,
    optional_fields: &ConstraintMap,
    mandatory_link_regexes: &IndexMap<String, String>,
    optional_link_regexes: &IndexMap<String, String>,
) -> LocalValidator {
    build_local_validator_with(
        mandatory_fields,
        optional_fields,
        mandatory_link_regexes,
        optional_link_regexes,
        &SchemaOptions::default(),
    )
}

fn build_local_validator_with(
    mandatory_fields: &ConstraintMap,
    optional_fields: &ConstraintMap,
    mandatory_link_regexes: &IndexMap<String, String>,
    optional_link_regexes: &IndexMap<String, String>,
    options: &SchemaOptions,
) -> LocalValidator {
    let mut validator = LocalValidator::default();

    for (field, pattern) in mandatory_fields {
        if is_ignored(field) {
            continue;
        }
        validator.required.push(field.clone());
        validator
            .properties
            .insert(field.clone(), field_pattern_schema(field, pattern));
    }

    for (field, pattern) in optional_fields {
        if is_ignored(field) {
            continue;
        }
        validator
            .properties
            .insert(field.clone(), field_pattern_schema(field, pattern));
    }

    for (field, pattern) in mandatory_link_regexes {
        let mut schema = PropertySchema::array();
        schema.min_items = Some(1);
        if options.link_id_patterns {
            schema.items = Some(Box::new(pattern_schema(pattern)));
        }
        validator.properties.insert(field.clone(), schema);
        validator.required.push(field.clone());
    }

    for (field, pattern) in optional_link_regexes {
        let mut schema = PropertySchema::array();
        if options.link_id_patterns {
            schema.items = Some(Box::new(pattern_schema(pattern)));
        }
        validator.properties.insert(field.clone(), schema);
    }

    validator
}

fn link_validator(target_type: &str) -> LinkValidator {
    let mut properties = IndexMap::new();
    properties.insert(
        "type".to_string(),
        PropertySchema {
            kind: Some(JsonType::String),
            constant: Some(target_type.to_string()),
            ..Default::default()
        },
    );
    LinkValidator {
        items: LinkedNeedValidator {
            local: LinkedNeedProperties { properties },
        },
    }
}

/// Build the network validator for plain target link constraints.
#[must_use]
pub fn build_network_validator(
    mandatory_link_targets: &IndexMap<String, String>,
    optional_link_targets: &IndexMap<String, String>,
) -> IndexMap<String, LinkValidator> {
    mandatory_link_targets
        .iter()
        .chain(optional_link_targets)
        .map(|(field, target)| (field.clone(), link_validator(target)))
        .collect()
}

/// Build the schema entry for one need type with default options.
///
/// Returns `None` for need types without any constraint.
#[must_use]
pub fn build_need_type_schema(need_type: &NeedType) -> Option<NeedTypeSchema> {
    build_need_type_schema_with(need_type, &SchemaOptions::default())
}

/// Build the schema entry for one need type.
#[must_use]
pub fn build_need_type_schema_with(
    need_type: &NeedType,
    options: &SchemaOptions,
) -> Option<NeedTypeSchema> {
    if !need_type.has_constraints() {
        return None;
    }

    let type_name = need_type.directive.as_str();
    let (mandatory_regexes, mandatory_targets) =
        classify_links(&need_type.mandatory_links, type_name, true);
    let (optional_regexes, optional_targets) =
        classify_links(&need_type.optional_links, type_name, false);

    let mut select_properties = IndexMap::new();
    select_properties.insert(
        "type".to_string(),
        PropertySchema {
            constant: Some(type_name.to_string()),
            ..Default::default()
        },
    );

    let local = build_local_validator_with(
        &need_type.mandatory_options,
        &need_type.optional_options,
        &mandatory_regexes,
        &optional_regexes,
        options,
    );

    let network = if options.network_validation {
        build_network_validator(&mandatory_targets, &optional_targets)
    } else {
        if !mandatory_targets.is_empty() || !optional_targets.is_empty() {
            debug!(
                "Skipping network validation for '{}' ({} link targets)",
                type_name,
                mandatory_targets.len() + optional_targets.len()
            );
        }
        IndexMap::new()
    };

    Some(NeedTypeSchema {
        id: format!("need-type-{type_name}"),
        severity: Severity::Violation,
        message: SCHEMA_MESSAGE.to_string(),
        select: Selector {
            properties: select_properties,
            required: vec!["type".to_string()],
        },
        validate: Validate { local, network },
    })
}

/// Compile every constrained need type of the metamodel.
#[must_use]
pub fn compile(metamodel: &MetaModel, options: &SchemaOptions) -> SchemaDefinitions {
    let schemas = metamodel
        .needs_types
        .iter()
        .filter_map(|need_type| build_need_type_schema_with(need_type, options))
        .collect::<Vec<_>>();

    debug!(
        "Compiled {} schemas from {} need types",
        schemas.len(),
        metamodel.needs_types.len()
    );

    SchemaDefinitions { schemas }
}

/// Write the schema definitions as pretty JSON to `<dir>/schemas.json`.
pub fn write_schemas(dir: &Path, definitions: &SchemaDefinitions) -> Result<SchemaOutput> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(SCHEMAS_FILE_NAME);
    let json = serde_json::to_string_pretty(definitions)?;
    std::fs::write(&path, json)?;

    info!(
        "Wrote {} schemas to {}",
        definitions.schemas.len(),
        path.display()
    );

    Ok(SchemaOutput {
        path,
        config_key: SCHEMAS_CONFIG_KEY,
        config_value: SCHEMAS_FILE_NAME,
        schema_count: definitions.schemas.len(),
    })
}
