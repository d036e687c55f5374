pub mod definition;
pub mod loader;
pub mod remote;
pub mod repository;
pub mod sync;

pub use definition::{BranchSpec, DefinitionDocument, DocumentError, EntryError, Field};
pub use loader::{
    AcquiredContent, ContentOrigin, DefinitionLoader, FetchError, FormatError, SourceFetcher,
    is_valid_url, parse_document, read_local_file,
};
pub use remote::{ProtectionUpdate, RefCreation, RefLookup, RemoteApi, RemoteError, RemoteResponse};
pub use repository::{
    BranchCreation, BranchRepository, Lookup, RefObject, RemoteBranchRepository, RemoteRef,
    RepositoryError,
};
pub use sync::{
    BranchOutcome, CoordinatesError, RepositoryCoordinates, SyncError, SyncReport, Synchronizer,
    reconcile,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
