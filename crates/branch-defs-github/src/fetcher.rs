use branch_defs::{FetchError, SourceFetcher};

use crate::client::USER_AGENT;

/// Downloads definition content over HTTP; local files use the default reader.
#[derive(Default)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
