//! Video search orchestration
//!
//! Two entry points sit on top of the collaborator crates:
//! - [`IngestionOrchestrator`]: download, transcode, transcribe, segment,
//!   embed and persist one source video, at most once per source
//! - [`QueryOrchestrator`]: embed a text or image query and return the
//!   `HH:MM:SS` anchors of the closest records
//!
//! [`Services::from_config`] wires both to the concrete adapters described by a
//! [`ServiceConfig`].

mod config;
mod error;
mod ingest;
mod locks;
mod search;
mod services;
mod stage;

pub use config::{
    ConfigError, PipelineConfig, ServerConfig, ServiceConfig, StoreConfig, TranscriptionSection,
    CONFIG_ENV,
};
pub use error::{IngestError, IngestStage, SearchError};
pub use ingest::{Collaborators, IngestOptions, IngestOutcome, IngestionOrchestrator};
pub use locks::SourceLocks;
pub use search::{
    ImageQuery, QueryOrchestrator, QueryPayload, SearchOptions, SearchRequest, DEFAULT_RESULTS,
};
pub use services::Services;
pub use stage::{run_stage, PersistSummary, PersistencePolicy, Stage};

pub use video_search_storage::OutputScope;
