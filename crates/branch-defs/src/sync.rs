use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::definition::{BranchSpec, DefinitionDocument, EntryError};
use crate::loader::{DefinitionLoader, SourceFetcher};
use crate::repository::{BranchCreation, BranchRepository, RepositoryError};

/// The `owner/repository` pair a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCoordinates {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("repository must be given as owner/repository, got {0:?}")]
pub struct CoordinatesError(pub String);

impl FromStr for RepositoryCoordinates {
    type Err = CoordinatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.to_owned(),
                repo: repo.to_owned(),
            }),
            _ => Err(CoordinatesError(s.to_owned())),
        }
    }
}

impl fmt::Display for RepositoryCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Errors that abort a reconciliation run. `Display` is the failure message.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("branches definition is not valid")]
    DefinitionInvalid,

    #[error("branches input content is not valid")]
    ContentInvalid {
        branch: String,
        #[source]
        cause: EntryError,
    },

    #[error(transparent)]
    Coordinates(#[from] CoordinatesError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What happened to a single declared branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub name: String,
    pub base: String,
    pub creation: BranchCreation,
    pub protected: bool,
}

/// Summary of a completed run, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub branches: Vec<BranchOutcome>,
}

impl SyncReport {
    pub fn created(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.creation == BranchCreation::Created)
            .count()
    }

    pub fn protected(&self) -> usize {
        self.branches.iter().filter(|b| b.protected).count()
    }
}

/// Reconcile every branch of `document` against `repository`, one at a time.
///
/// The first failure aborts the run. Branches handled before it stay as they
/// are; re-running is safe because branch creation is idempotent.
pub async fn reconcile<R: BranchRepository + ?Sized>(
    repository: &R,
    document: &DefinitionDocument,
    default_base: &str,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();

    for (name, entry) in document.branches() {
        info!("Manage branch: {name}");

        let spec = BranchSpec::from_entry(name, entry).map_err(|cause| SyncError::ContentInvalid {
            branch: name.to_owned(),
            cause,
        })?;

        let base = match &spec {
            Some(spec) => {
                if let Some(base) = spec.base_branch.present() {
                    debug!("Base branch is defined: {base}");
                }
                spec.base_or(default_base)
            }
            None => default_base,
        };

        let creation = repository.create_branch(name, base).await?;

        let protection = spec.as_ref().and_then(BranchSpec::protection);
        if let Some(permission) = protection {
            info!("Define Permission");
            repository.set_branch_permission(name, permission).await?;
        }

        report.branches.push(BranchOutcome {
            name: name.to_owned(),
            base: base.to_owned(),
            creation,
            protected: protection.is_some(),
        });
    }

    Ok(report)
}

/// Drives a full run: coordinates, definition loading, then reconciliation.
pub struct Synchronizer<F, C> {
    loader: DefinitionLoader<F>,
    connect: C,
}

impl<F: SourceFetcher, C> Synchronizer<F, C> {
    /// `connect` opens the repository session for the parsed coordinates.
    pub fn new(loader: DefinitionLoader<F>, connect: C) -> Self {
        Self { loader, connect }
    }

    pub async fn run<R>(
        &self,
        source: &str,
        coordinates: &str,
        default_base: &str,
    ) -> Result<SyncReport, SyncError>
    where
        C: Fn(&RepositoryCoordinates) -> R,
        R: BranchRepository,
    {
        let coordinates: RepositoryCoordinates = coordinates.parse()?;
        let repository = (self.connect)(&coordinates);

        let document = self
            .loader
            .load(source)
            .await
            .ok_or(SyncError::DefinitionInvalid)?;

        reconcile(&repository, &document, default_base).await
    }
}
