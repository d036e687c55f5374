use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Value, json};

use crate::loader::{FetchError, SourceFetcher};
use crate::remote::{
    ProtectionUpdate, RefCreation, RefLookup, RemoteApi, RemoteError, RemoteResponse,
};
use crate::repository::{BranchCreation, BranchRepository, RemoteRef, RepositoryError};

/// GitHub-shaped payload for a branch reference.
pub fn ref_payload(branch: &str, sha: &str) -> Value {
    json!({
        "ref": format!("refs/heads/{branch}"),
        "node_id": format!("REF_{branch}"),
        "url": format!("https://api.github.com/repos/owner/repo/git/refs/heads/{branch}"),
        "object": {
            "sha": sha,
            "type": "commit",
            "url": format!("https://api.github.com/repos/owner/repo/git/commits/{sha}"),
        }
    })
}

/// A request seen by `ScriptedFetcher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    Download(String),
    ReadFile(String),
}

/// In-memory fetcher: serves configured links and files, records every attempt.
#[derive(Default)]
pub struct ScriptedFetcher {
    downloads: HashMap<String, String>,
    files: HashMap<String, String>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download(mut self, url: &str, content: &str) -> Self {
        self.downloads.insert(url.to_owned(), content.to_owned());
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_owned(), content.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: FetchCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn download(&self, url: &str) -> Result<String, FetchError> {
        self.record(FetchCall::Download(url.to_owned()));
        self.downloads
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }

    async fn read_file(&self, path: &str) -> Result<String, FetchError> {
        self.record(FetchCall::ReadFile(path.to_owned()));
        self.files.get(path).cloned().ok_or(FetchError::NotFound)
    }
}

/// A request seen by `ScriptedRemote`.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    GetRef(RefLookup),
    CreateRef(RefCreation),
    UpdateProtection(ProtectionUpdate),
}

#[derive(Default)]
struct RemoteState {
    branches: HashMap<String, String>,
    lookup_overrides: HashMap<String, Result<u16, RemoteError>>,
    calls: Vec<RemoteCall>,
}

/// In-memory remote host. Known branches answer 200, unknown ones fail with
/// a 404 status error, and successful creations become visible to later
/// lookups.
pub struct ScriptedRemote {
    state: Mutex<RemoteState>,
    create_status: u16,
    protection_status: u16,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            create_status: 201,
            protection_status: 200,
        }
    }
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(self, name: &str, sha: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.branches.insert(name.to_owned(), sha.to_owned());
        }
        self
    }

    /// Answer lookups of `name` with a bare `status` response.
    pub fn with_lookup_status(self, name: &str, status: u16) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.lookup_overrides.insert(name.to_owned(), Ok(status));
        }
        self
    }

    /// Fail lookups of `name` with `error`.
    pub fn with_lookup_error(self, name: &str, error: RemoteError) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.lookup_overrides.insert(name.to_owned(), Err(error));
        }
        self
    }

    pub fn with_create_status(mut self, status: u16) -> Self {
        self.create_status = status;
        self
    }

    pub fn with_protection_status(mut self, status: u16) -> Self {
        self.protection_status = status;
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn creations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::CreateRef(_)))
            .count()
    }

    pub fn protection_updates(&self) -> Vec<ProtectionUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::UpdateProtection(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, RemoteState>, RemoteError> {
        self.state
            .lock()
            .map_err(|_| RemoteError::Transport("scripted remote poisoned".into()))
    }
}

#[async_trait::async_trait]
impl RemoteApi for ScriptedRemote {
    async fn get_ref(&self, request: &RefLookup) -> Result<RemoteResponse, RemoteError> {
        let mut state = self.state()?;
        state.calls.push(RemoteCall::GetRef(request.clone()));

        let name = request
            .reference
            .strip_prefix("heads/")
            .unwrap_or(&request.reference);

        if let Some(outcome) = state.lookup_overrides.get(name) {
            return outcome.clone().map(RemoteResponse::status_only);
        }

        match state.branches.get(name) {
            Some(sha) => Ok(RemoteResponse::new(200, ref_payload(name, sha))),
            None => Err(RemoteError::Status {
                status: 404,
                message: "Not Found".into(),
            }),
        }
    }

    async fn create_ref(&self, request: &RefCreation) -> Result<RemoteResponse, RemoteError> {
        let mut state = self.state()?;
        state.calls.push(RemoteCall::CreateRef(request.clone()));

        if self.create_status == 201 {
            let name = request
                .reference
                .strip_prefix("refs/heads/")
                .unwrap_or(&request.reference);
            state.branches.insert(name.to_owned(), request.sha.clone());
            return Ok(RemoteResponse::new(201, ref_payload(name, &request.sha)));
        }

        Ok(RemoteResponse::status_only(self.create_status))
    }

    async fn update_branch_protection(
        &self,
        request: &ProtectionUpdate,
    ) -> Result<RemoteResponse, RemoteError> {
        let mut state = self.state()?;
        state.calls.push(RemoteCall::UpdateProtection(request.clone()));
        Ok(RemoteResponse::status_only(self.protection_status))
    }
}

/// A call seen by `RecordingRepository`.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryCall {
    Create { name: String, from: String },
    Protect { name: String, permission: Value },
}

/// Branch repository that records calls and succeeds unless told otherwise.
#[derive(Default)]
pub struct RecordingRepository {
    calls: Mutex<Vec<RepositoryCall>>,
    create_failures: HashMap<String, RepositoryError>,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_branch(name, _)` fail with `error`.
    pub fn failing_create(mut self, name: &str, error: RepositoryError) -> Self {
        self.create_failures.insert(name.to_owned(), error);
        self
    }

    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn creations(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepositoryCall::Create { name, from } => Some((name, from)),
                RepositoryCall::Protect { .. } => None,
            })
            .collect()
    }

    pub fn protections(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepositoryCall::Protect { name, permission } => Some((name, permission)),
                RepositoryCall::Create { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: RepositoryCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait::async_trait]
impl BranchRepository for RecordingRepository {
    async fn get_branch(&self, _name: &str) -> Result<Option<RemoteRef>, RepositoryError> {
        Ok(None)
    }

    async fn create_branch(
        &self,
        name: &str,
        from: &str,
    ) -> Result<BranchCreation, RepositoryError> {
        self.record(RepositoryCall::Create {
            name: name.to_owned(),
            from: from.to_owned(),
        });

        match self.create_failures.get(name) {
            Some(error) => Err(error.clone()),
            None => Ok(BranchCreation::Created),
        }
    }

    async fn set_branch_permission(
        &self,
        name: &str,
        permission: &Value,
    ) -> Result<(), RepositoryError> {
        self.record(RepositoryCall::Protect {
            name: name.to_owned(),
            permission: permission.clone(),
        });
        Ok(())
    }
}
