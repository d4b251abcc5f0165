// Domain Layer - Pure business logic and entities

pub mod artifact;
pub mod error;
pub mod job;
pub mod report;
pub mod snapshot;

// Re-exports
pub use artifact::{ArtifactClass, ExtensionSet, ProtectedPaths};
pub use error::DomainError;
pub use job::{Job, UnitKind};
pub use report::{
    JobReport, JobStatus, MoveFailure, MovedArtifact, PipelineReport, SaveFailure, SkipReason,
};
pub use snapshot::{ChangeDetection, FileStamp, Fingerprint, Snapshot};
