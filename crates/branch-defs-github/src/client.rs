use branch_defs::{
    ProtectionUpdate, RefCreation, RefLookup, RemoteApi, RemoteError, RemoteResponse,
};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub(crate) const USER_AGENT: &str = "branch-def-sync";
const ACCEPT: &str = "application/vnd.github+json";

/// REST client for the git reference and branch protection endpoints.
///
/// The client is the authenticated session: the token, when present, is sent
/// as a bearer credential on every request.
pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    api_base_url: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>, api_base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_base_url,
        }
    }

    fn api_base(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or("https://api.github.com")
            .trim_end_matches('/')
    }

    /// Join `segments` onto the API base, percent-encoding each one.
    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, RemoteError> {
        let base = self.api_base();
        let mut url = Url::parse(base)
            .map_err(|e| RemoteError::Transport(format!("invalid API base URL {base}: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Transport(format!("API base URL {base} cannot take a path"))
            })?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn build_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT);

        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        req
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<RemoteResponse, RemoteError> {
        let response = req
            .send()
            .await
            .map_err(|e| RemoteError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            debug!("GitHub answered HTTP {status}");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        };

        Ok(RemoteResponse::new(status.as_u16(), data))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// GitHub's `message` field when the body carries one, the raw body otherwise.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or_default().to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[async_trait::async_trait]
impl RemoteApi for GitHubClient {
    async fn get_ref(&self, request: &RefLookup) -> Result<RemoteResponse, RemoteError> {
        // `heads/<name>`: the slashes of the reference stay path separators.
        let url = self.endpoint(
            ["repos", request.owner.as_str(), request.repo.as_str(), "git", "ref"]
                .into_iter()
                .chain(request.reference.split('/')),
        )?;

        self.execute(self.build_request(Method::GET, url)).await
    }

    async fn create_ref(&self, request: &RefCreation) -> Result<RemoteResponse, RemoteError> {
        let url = self.endpoint([
            "repos",
            request.owner.as_str(),
            request.repo.as_str(),
            "git",
            "refs",
        ])?;
        let body = json!({ "ref": request.reference, "sha": request.sha });

        self.execute(self.build_request(Method::POST, url).json(&body))
            .await
    }

    async fn update_branch_protection(
        &self,
        request: &ProtectionUpdate,
    ) -> Result<RemoteResponse, RemoteError> {
        let (Some(owner), Some(repo), Some(branch)) =
            (request.owner(), request.repo(), request.branch())
        else {
            return Err(RemoteError::Transport(
                "protection update is missing owner, repo or branch".into(),
            ));
        };

        let url = self.endpoint(["repos", owner, repo, "branches", branch, "protection"])?;
        let body = Value::Object(request.rules());

        self.execute(self.build_request(Method::PUT, url).json(&body))
            .await
    }
}
