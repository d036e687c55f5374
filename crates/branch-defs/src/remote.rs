use serde_json::{Map, Value};

/// Response from a remote operation: a status code and a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub data: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            data: Value::Null,
        }
    }
}

/// A remote operation that failed before a usable response was produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The host answered with a failure status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// No status is available (connection refused, timeout, TLS, ...).
    #[error("{0}")]
    Transport(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

/// Lookup of a single git reference, e.g. `heads/main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLookup {
    pub owner: String,
    pub repo: String,
    pub reference: String,
}

/// Creation of a git reference, e.g. `refs/heads/develop`, pointing at `sha`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCreation {
    pub owner: String,
    pub repo: String,
    pub reference: String,
    pub sha: String,
}

/// Branch protection update: the identity fields (`owner`, `repo`, `branch`)
/// plus the protection rules, all as one flat parameter record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionUpdate {
    pub params: Map<String, Value>,
}

impl ProtectionUpdate {
    pub fn owner(&self) -> Option<&str> {
        self.param("owner")
    }

    pub fn repo(&self) -> Option<&str> {
        self.param("repo")
    }

    pub fn branch(&self) -> Option<&str> {
        self.param("branch")
    }

    /// The protection rules without the identity fields.
    pub fn rules(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "owner" | "repo" | "branch"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Wire capability for the remote code host.
///
/// Implementations may report a failure status either as an `Ok` response or
/// as `RemoteError::Status`; callers classify both.
#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_ref(&self, request: &RefLookup) -> Result<RemoteResponse, RemoteError>;

    async fn create_ref(&self, request: &RefCreation) -> Result<RemoteResponse, RemoteError>;

    async fn update_branch_protection(
        &self,
        request: &ProtectionUpdate,
    ) -> Result<RemoteResponse, RemoteError>;
}

#[async_trait::async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for std::sync::Arc<T> {
    async fn get_ref(&self, request: &RefLookup) -> Result<RemoteResponse, RemoteError> {
        (**self).get_ref(request).await
    }

    async fn create_ref(&self, request: &RefCreation) -> Result<RemoteResponse, RemoteError> {
        (**self).create_ref(request).await
    }

    async fn update_branch_protection(
        &self,
        request: &ProtectionUpdate,
    ) -> Result<RemoteResponse, RemoteError> {
        (**self).update_branch_protection(request).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn protection_update_splits_identity_from_rules() {
        let params = json!({
            "enforce_admins": true,
            "owner": "octo",
            "repo": "widgets",
            "branch": "develop",
        });
        let Value::Object(params) = params else {
            panic!("expected an object");
        };
        let update = ProtectionUpdate { params };

        assert_eq!(update.owner(), Some("octo"));
        assert_eq!(update.repo(), Some("widgets"));
        assert_eq!(update.branch(), Some("develop"));

        let rules = update.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("enforce_admins"), Some(&json!(true)));
    }

    #[test]
    fn remote_error_status() {
        let err = RemoteError::Status {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
        assert_eq!(RemoteError::Transport("refused".into()).status(), None);
    }
}
