use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::definition::kind_of;
use crate::remote::{
    ProtectionUpdate, RefCreation, RefLookup, RemoteApi, RemoteError, RemoteResponse,
};

/// A branch's current pointer on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub object: RefObject,
}

impl RemoteRef {
    pub fn sha(&self) -> &str {
        &self.object.sha
    }
}

/// The object a reference points at; for branches, a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefObject {
    pub sha: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Outcome of a branch lookup that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(RemoteRef),
    Absent,
}

/// Outcome of `create_branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCreation {
    Created,
    AlreadyExists,
}

/// Fatal failures of branch operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Error when trying to check for branch: {status}{}", with_message(.message))]
    LookupFailed {
        branch: String,
        status: u16,
        message: Option<String>,
    },

    #[error("unexpected reference payload for branch {branch}: {reason}")]
    UnexpectedPayload { branch: String, reason: String },

    #[error("Branch {branch} can not be created as base branch {base} does not exist")]
    MissingBase { branch: String, base: String },

    #[error("Error when trying to create the branch {branch}: {detail}")]
    CreateFailed { branch: String, detail: String },

    #[error("Error when trying to set permission for the branch {branch}: {detail}")]
    ProtectionFailed { branch: String, detail: String },

    #[error("permission for the branch {branch} must be a mapping, got {kind}")]
    InvalidPermission { branch: String, kind: String },

    /// A transport failure with no status, passed through unchanged.
    #[error(transparent)]
    Remote(RemoteError),
}

fn with_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// Branch operations against a single remote repository.
#[async_trait::async_trait]
pub trait BranchRepository: Send + Sync {
    /// Look up a branch. `Ok(None)` means the branch does not exist.
    async fn get_branch(&self, name: &str) -> Result<Option<RemoteRef>, RepositoryError>;

    /// Create `name` from the current head of `from`. Existing branches are
    /// left untouched.
    async fn create_branch(&self, name: &str, from: &str)
    -> Result<BranchCreation, RepositoryError>;

    /// Apply protection rules to `name`.
    async fn set_branch_permission(
        &self,
        name: &str,
        permission: &Value,
    ) -> Result<(), RepositoryError>;
}

#[async_trait::async_trait]
impl<T: BranchRepository + ?Sized> BranchRepository for std::sync::Arc<T> {
    async fn get_branch(&self, name: &str) -> Result<Option<RemoteRef>, RepositoryError> {
        (**self).get_branch(name).await
    }

    async fn create_branch(
        &self,
        name: &str,
        from: &str,
    ) -> Result<BranchCreation, RepositoryError> {
        (**self).create_branch(name, from).await
    }

    async fn set_branch_permission(
        &self,
        name: &str,
        permission: &Value,
    ) -> Result<(), RepositoryError> {
        (**self).set_branch_permission(name, permission).await
    }
}

/// Classify the outcome of a reference lookup into found, absent, or fatal.
pub fn classify_lookup(
    branch: &str,
    outcome: Result<RemoteResponse, RemoteError>,
) -> Result<Lookup, RepositoryError> {
    match outcome {
        Ok(RemoteResponse { status: 200, data }) => serde_json::from_value(data)
            .map(Lookup::Found)
            .map_err(|e| RepositoryError::UnexpectedPayload {
                branch: branch.to_owned(),
                reason: e.to_string(),
            }),
        Ok(RemoteResponse { status: 404, .. }) | Err(RemoteError::Status { status: 404, .. }) => {
            Ok(Lookup::Absent)
        }
        Ok(RemoteResponse { status, data }) => Err(RepositoryError::LookupFailed {
            branch: branch.to_owned(),
            status,
            message: data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }),
        Err(RemoteError::Status { status, message }) => Err(RepositoryError::LookupFailed {
            branch: branch.to_owned(),
            status,
            message: Some(message).filter(|m| !m.is_empty()),
        }),
        Err(transport @ RemoteError::Transport(_)) => Err(RepositoryError::Remote(transport)),
    }
}

/// Build protection parameters: the permission's keys first, then the
/// identity fields, which always win.
pub fn protection_params(
    owner: &str,
    repo: &str,
    branch: &str,
    permission: &Value,
) -> Result<Map<String, Value>, RepositoryError> {
    let mut params = match permission {
        Value::Null => Map::new(),
        Value::Object(rules) => rules.clone(),
        other => {
            return Err(RepositoryError::InvalidPermission {
                branch: branch.to_owned(),
                kind: kind_of(other).to_owned(),
            });
        }
    };

    params.insert("owner".into(), Value::String(owner.to_owned()));
    params.insert("repo".into(), Value::String(repo.to_owned()));
    params.insert("branch".into(), Value::String(branch.to_owned()));

    Ok(params)
}

fn failure_detail(outcome: &Result<RemoteResponse, RemoteError>) -> String {
    match outcome {
        Ok(response) if response.data.is_null() => format!("HTTP {}", response.status),
        Ok(response) => format!("HTTP {}: {}", response.status, response.data),
        Err(e) => e.to_string(),
    }
}

/// `BranchRepository` backed by a remote API session.
pub struct RemoteBranchRepository<A> {
    owner: String,
    repo: String,
    api: A,
}

impl<A: RemoteApi> RemoteBranchRepository<A> {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, api: A) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            api,
        }
    }

    /// Look up a branch and classify the outcome.
    pub async fn lookup(&self, name: &str) -> Result<Lookup, RepositoryError> {
        let request = RefLookup {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            reference: format!("heads/{name}"),
        };

        classify_lookup(name, self.api.get_ref(&request).await)
    }
}

#[async_trait::async_trait]
impl<A: RemoteApi> BranchRepository for RemoteBranchRepository<A> {
    #[instrument(skip(self))]
    async fn get_branch(&self, name: &str) -> Result<Option<RemoteRef>, RepositoryError> {
        match self.lookup(name).await? {
            Lookup::Found(found) => Ok(Some(found)),
            Lookup::Absent => {
                debug!("branch {name} does not exist");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn create_branch(
        &self,
        name: &str,
        from: &str,
    ) -> Result<BranchCreation, RepositoryError> {
        if self.get_branch(name).await?.is_some() {
            debug!("branch {name} already exists");
            return Ok(BranchCreation::AlreadyExists);
        }

        let Some(base) = self.get_branch(from).await? else {
            return Err(RepositoryError::MissingBase {
                branch: name.to_owned(),
                base: from.to_owned(),
            });
        };

        let request = RefCreation {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            reference: format!("refs/heads/{name}"),
            sha: base.sha().to_owned(),
        };

        match self.api.create_ref(&request).await {
            Ok(RemoteResponse { status: 201, .. }) => {
                info!("created branch {name} from {from} at {}", base.sha());
                Ok(BranchCreation::Created)
            }
            Err(transport @ RemoteError::Transport(_)) => Err(RepositoryError::Remote(transport)),
            other => Err(RepositoryError::CreateFailed {
                branch: name.to_owned(),
                detail: failure_detail(&other),
            }),
        }
    }

    #[instrument(skip(self, permission))]
    async fn set_branch_permission(
        &self,
        name: &str,
        permission: &Value,
    ) -> Result<(), RepositoryError> {
        let request = ProtectionUpdate {
            params: protection_params(&self.owner, &self.repo, name, permission)?,
        };

        match self.api.update_branch_protection(&request).await {
            Ok(RemoteResponse { status: 200, .. }) => {
                info!("protection applied to branch {name}");
                Ok(())
            }
            Err(transport @ RemoteError::Transport(_)) => Err(RepositoryError::Remote(transport)),
            other => Err(RepositoryError::ProtectionFailed {
                branch: name.to_owned(),
                detail: failure_detail(&other),
            }),
        }
    }
}
