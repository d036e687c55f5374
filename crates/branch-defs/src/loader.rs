use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::definition::{DefinitionDocument, DocumentError};

/// Link grammar: optional http(s) scheme, dotted domain or IPv4 host, then
/// optional port, path, query and fragment.
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(https?://)?",
        r"((([a-z\d]([a-z\d-]*[a-z\d])*)\.)+[a-z]{2,}|",
        r"((\d{1,3}\.){3}\d{1,3}))",
        r"(:\d+)?(/[-a-z\d%_.~+]*)*",
        r"(\?[;&a-z\d%_.~+=-]*)?",
        r"(#[-a-z\d_]*)?$",
    ))
    .expect("link pattern is valid")
});

/// Returns true if `candidate` looks like a web link.
pub fn is_valid_url(candidate: &str) -> bool {
    LINK_PATTERN.is_match(candidate)
}

/// Why a single acquisition attempt produced no content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("content is not valid UTF-8: {0}")]
    Decode(String),

    #[error("no such file")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Acquires raw definition content from a link or a local path.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download the body behind `url`.
    async fn download(&self, url: &str) -> Result<String, FetchError>;

    /// Read a local file.
    async fn read_file(&self, path: &str) -> Result<String, FetchError> {
        read_local_file(Path::new(path))
    }
}

/// Read a file as bytes and decode it as UTF-8.
pub fn read_local_file(path: &Path) -> Result<String, FetchError> {
    if !path.is_file() {
        return Err(FetchError::NotFound);
    }

    let bytes = std::fs::read(path).map_err(|e| FetchError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Why content could not be read in a given format.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not valid YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error(transparent)]
    Shape(#[from] DocumentError),
}

/// Strict format: JSON.
pub fn parse_json(content: &str) -> Result<DefinitionDocument, FormatError> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    Ok(DefinitionDocument::try_from(value)?)
}

/// Permissive format: YAML.
pub fn parse_yaml(content: &str) -> Result<DefinitionDocument, FormatError> {
    let value: serde_json::Value = serde_yaml_ng::from_str(content)?;
    Ok(DefinitionDocument::try_from(value)?)
}

/// Parse content as JSON, falling back to YAML.
pub fn parse_document(content: &str) -> Option<DefinitionDocument> {
    match parse_json(content) {
        Ok(document) => return Some(document),
        Err(e) => debug!("input is not a JSON definition: {e}"),
    }

    match parse_yaml(content) {
        Ok(document) => {
            debug!("input is parsed as YAML");
            Some(document)
        }
        Err(e) => {
            debug!("input is not a YAML definition: {e}");
            None
        }
    }
}

/// Where the definition content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    Link,
    Path,
    Literal,
}

/// Raw definition content together with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredContent {
    pub origin: ContentOrigin,
    pub content: String,
}

/// Turns a source descriptor (link, path, or the definition itself) into a
/// definition document.
pub struct DefinitionLoader<F> {
    fetcher: F,
}

impl<F: SourceFetcher> DefinitionLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Acquire content: link first, then local path, then the descriptor itself.
    pub async fn acquire(&self, source: &str) -> AcquiredContent {
        if is_valid_url(source) {
            match self.fetcher.download(&link_url(source)).await {
                Ok(content) => {
                    debug!("definition downloaded from {source}");
                    return AcquiredContent {
                        origin: ContentOrigin::Link,
                        content,
                    };
                }
                Err(e) => debug!("could not download {source}: {e}"),
            }
        } else {
            debug!("input is not a valid web link");
        }

        match self.fetcher.read_file(source).await {
            Ok(content) => {
                debug!("definition read from file");
                return AcquiredContent {
                    origin: ContentOrigin::Path,
                    content,
                };
            }
            Err(e) => debug!("input is not a readable file: {e}"),
        }

        debug!("input should be the definition itself");
        AcquiredContent {
            origin: ContentOrigin::Literal,
            content: source.to_owned(),
        }
    }

    /// Load a definition document. Never fails: unreachable or malformed
    /// sources yield `None`.
    pub async fn load(&self, source: &str) -> Option<DefinitionDocument> {
        let acquired = self.acquire(source).await;
        parse_document(&acquired.content)
    }
}

fn link_url(source: &str) -> String {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        source.to_owned()
    } else {
        format!("https://{source}")
    }
}
