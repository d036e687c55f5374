use serde_json::{Map, Value};

const BASE_BRANCH_KEY: &str = "baseBranch";
const PERMISSION_KEY: &str = "permission";

static NO_RULES: Value = Value::Null;

/// Errors raised when parsed content cannot serve as a definition document.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("definition content is empty")]
    Empty,

    #[error("definition content must be a mapping of branch names, got {0}")]
    NotAMapping(&'static str),
}

/// Error raised when a single branch entry has an unusable shape.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid definition for branch {branch}: {reason}")]
pub struct EntryError {
    pub branch: String,
    pub reason: String,
}

/// A field of a branch spec, keeping "key absent" apart from "key set to null".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    #[default]
    Missing,
    Null,
    Present(T),
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// The carried value, if the key held a non-null value.
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Missing | Self::Null => None,
        }
    }
}

/// Desired configuration for a single branch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchSpec {
    pub base_branch: Field<String>,
    /// Protection rules, passed through to the remote host verbatim.
    pub permission: Field<Value>,
}

impl BranchSpec {
    /// Interpret a raw document entry.
    ///
    /// `null` yields `None` (all defaults, no protection). A mapping yields a
    /// spec. Anything else is rejected.
    pub fn from_entry(branch: &str, entry: &Value) -> Result<Option<Self>, EntryError> {
        let fields = match entry {
            Value::Null => return Ok(None),
            Value::Object(fields) => fields,
            other => {
                return Err(EntryError {
                    branch: branch.to_owned(),
                    reason: format!("expected a mapping or null, got {}", kind_of(other)),
                });
            }
        };

        let base_branch = match fields.get(BASE_BRANCH_KEY) {
            None => Field::Missing,
            Some(Value::Null) => Field::Null,
            Some(Value::String(name)) => Field::Present(name.clone()),
            Some(other) => {
                return Err(EntryError {
                    branch: branch.to_owned(),
                    reason: format!("{BASE_BRANCH_KEY} must be a string, got {}", kind_of(other)),
                });
            }
        };

        let permission = match fields.get(PERMISSION_KEY) {
            None => Field::Missing,
            Some(Value::Null) => Field::Null,
            Some(value) => Field::Present(value.clone()),
        };

        Ok(Some(Self {
            base_branch,
            permission,
        }))
    }

    /// The base branch to anchor on, falling back to `default` when unset.
    pub fn base_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_branch
            .present()
            .map(String::as_str)
            .unwrap_or(default)
    }

    /// The permission payload to apply, if the spec asks for protection at all.
    /// A null permission still asks for protection, with no rules of its own.
    pub fn protection(&self) -> Option<&Value> {
        match &self.permission {
            Field::Missing => None,
            Field::Null => Some(&NO_RULES),
            Field::Present(value) => Some(value),
        }
    }
}

/// Parsed mapping of branch name to raw branch entry, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionDocument {
    entries: Map<String, Value>,
}

impl DefinitionDocument {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.entries.contains_key(branch)
    }

    pub fn entry(&self, branch: &str) -> Option<&Value> {
        self.entries.get(branch)
    }

    /// Branch names with their raw entries, in document order.
    pub fn branches(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}

impl TryFrom<Value> for DefinitionDocument {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            Value::Null => Err(DocumentError::Empty),
            other => Err(DocumentError::NotAMapping(kind_of(&other))),
        }
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_entry_has_no_spec() {
        let spec = BranchSpec::from_entry("develop", &Value::Null).unwrap();
        assert!(spec.is_none());
    }

    #[test]
    fn empty_mapping_uses_defaults() {
        let spec = BranchSpec::from_entry("develop", &json!({})).unwrap().unwrap();
        assert!(spec.base_branch.is_missing());
        assert!(spec.permission.is_missing());
        assert_eq!(spec.base_or("main"), "main");
        assert!(spec.protection().is_none());
    }

    #[test]
    fn base_branch_overrides_default() {
        let spec = BranchSpec::from_entry("develop", &json!({ "baseBranch": "release" }))
            .unwrap()
            .unwrap();
        assert_eq!(spec.base_branch, Field::Present("release".into()));
        assert_eq!(spec.base_or("main"), "release");
    }

    #[test]
    fn null_base_branch_falls_back_to_default() {
        let spec = BranchSpec::from_entry("develop", &json!({ "baseBranch": null }))
            .unwrap()
            .unwrap();
        assert_eq!(spec.base_branch, Field::Null);
        assert_eq!(spec.base_or("main"), "main");
    }

    #[test]
    fn non_string_base_branch_is_rejected() {
        let err = BranchSpec::from_entry("develop", &json!({ "baseBranch": 3 })).unwrap_err();
        assert_eq!(err.branch, "develop");
        assert!(err.reason.contains("baseBranch"));
    }

    #[test]
    fn permission_is_kept_verbatim() {
        let rules = json!({ "enforce_admins": true, "restrictions": null });
        let spec = BranchSpec::from_entry("develop", &json!({ "permission": rules.clone() }))
            .unwrap()
            .unwrap();
        assert_eq!(spec.protection(), Some(&rules));
    }

    #[test]
    fn null_permission_still_requests_protection() {
        let spec = BranchSpec::from_entry("develop", &json!({ "permission": null }))
            .unwrap()
            .unwrap();
        assert_eq!(spec.permission, Field::Null);
        assert_eq!(spec.protection(), Some(&Value::Null));
    }

    #[test]
    fn scalar_entry_is_rejected() {
        let err = BranchSpec::from_entry("testkey", &json!("testvalue")).unwrap_err();
        assert_eq!(err.branch, "testkey");
        assert!(err.reason.contains("a string"));
    }

    #[test]
    fn document_keeps_source_order() {
        let doc = DefinitionDocument::try_from(json!({
            "zeta": null,
            "alpha": { "baseBranch": "zeta" },
            "mid": {}
        }))
        .unwrap();

        let names: Vec<&str> = doc.branches().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn null_entry_is_distinct_from_absent_branch() {
        let doc = DefinitionDocument::try_from(json!({ "develop": null })).unwrap();
        assert!(doc.contains("develop"));
        assert_eq!(doc.entry("develop"), Some(&Value::Null));
        assert!(!doc.contains("feature"));
        assert_eq!(doc.entry("feature"), None);
    }

    #[test]
    fn null_content_is_not_a_document() {
        assert_eq!(
            DefinitionDocument::try_from(Value::Null),
            Err(DocumentError::Empty)
        );
    }

    #[test]
    fn scalar_content_is_not_a_document() {
        assert_eq!(
            DefinitionDocument::try_from(json!("strangecontent")),
            Err(DocumentError::NotAMapping("a string"))
        );
        assert_eq!(
            DefinitionDocument::try_from(json!(["develop"])),
            Err(DocumentError::NotAMapping("a sequence"))
        );
    }
}
