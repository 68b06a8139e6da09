//! Reading the host's `needs.json` export.
//!
//! ```json
//! {
//!   "current_version": "1.0",
//!   "versions": {
//!     "1.0": { "needs": { "tool_req__docs_id": { "type": "tool_req", "docname": "tool_reqs", ... } } }
//!   }
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{DocsError, Result};

/// Needs keyed by ID, in export order.
pub type Needs = IndexMap<String, Need>;

/// One need as exported by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Need {
    pub id: String,
    pub need_type: String,
    pub docname: String,
    /// Every other exported field.
    pub fields: IndexMap<String, Value>,
}

impl Need {
    #[must_use]
    pub fn new(id: impl Into<String>, need_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            need_type: need_type.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_docname(mut self, docname: impl Into<String>) -> Self {
        self.docname = docname.into();
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Text of an option. Lists are joined with spaces, `null` is absent.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<String> {
        match name {
            "id" => return Some(self.id.clone()),
            "type" => return Some(self.need_type.clone()),
            "docname" => return Some(self.docname.clone()),
            _ => {}
        }
        match self.fields.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            other => Some(value_text(other)),
        }
    }

    fn from_json(key: &str, value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(DocsError::needs(format!("need '{key}' is not an object")));
        };

        let mut need = Need {
            id: key.to_string(),
            ..Default::default()
        };
        for (field, value) in map {
            match field.as_str() {
                "id" => {
                    if let Value::String(id) = value {
                        need.id = id;
                    }
                }
                "type" => need.need_type = value_text(&value),
                "docname" => need.docname = value_text(&value),
                _ => {
                    need.fields.insert(field, value);
                }
            }
        }
        Ok(need)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a `needs.json` document.
///
/// Uses `current_version`, falling back to the first version when it is
/// missing or empty.
pub fn parse_needs(content: &str) -> Result<Needs> {
    let root: Value = serde_json::from_str(content)?;
    let Value::Object(mut root) = root else {
        return Err(DocsError::needs("top level is not an object"));
    };

    let Some(Value::Object(mut versions)) = root.remove("versions") else {
        return Err(DocsError::needs("missing 'versions' table"));
    };

    let current = root
        .get("current_version")
        .and_then(Value::as_str)
        .filter(|v| versions.contains_key(*v))
        .map(str::to_string)
        .or_else(|| versions.keys().next().cloned())
        .ok_or_else(|| DocsError::needs("no versions exported"))?;

    let Some(Value::Object(mut version)) = versions.remove(&current) else {
        return Err(DocsError::needs(format!("version '{current}' is not an object")));
    };

    let raw_needs = match version.remove("needs") {
        Some(Value::Object(needs)) => needs,
        Some(_) => return Err(DocsError::needs("'needs' is not an object")),
        None => serde_json::Map::new(),
    };

    let mut needs = Needs::new();
    for (key, value) in raw_needs {
        let need = Need::from_json(&key, value)?;
        needs.insert(need.id.clone(), need);
    }

    debug!("Loaded {} needs (version '{}')", needs.len(), current);
    Ok(needs)
}

/// Load needs from a `needs.json` file.
pub fn load_needs(path: &Path) -> Result<Needs> {
    if !path.exists() {
        return Err(DocsError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    parse_needs(&std::fs::read_to_string(path)?)
}
