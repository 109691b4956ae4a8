//! Typed pipeline stages.
//!
//! Each stage turns one owned value into the next and reports failures as a
//! stage-tagged [`IngestError`]. The ingestion pipeline is the `?` chain of
//! [`run_stage`] calls.

use crate::{IngestError, IngestStage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

/// One step of an ingestion run
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn stage(&self) -> IngestStage;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, IngestError>;
}

/// Run `stage`, logging start, finish and elapsed time
pub async fn run_stage<S: Stage>(stage: &S, input: S::Input) -> Result<S::Output, IngestError> {
    let name = stage.stage();
    info!("Stage {} started", name);
    let started = Instant::now();

    match stage.run(input).await {
        Ok(output) => {
            info!(
                "Stage {} finished in {:.2}s",
                name,
                started.elapsed().as_secs_f64()
            );
            Ok(output)
        }
        Err(e) => {
            error!(
                "Stage {} failed after {:.2}s: {}",
                name,
                started.elapsed().as_secs_f64(),
                e
            );
            Err(e)
        }
    }
}

/// How a modality reacts to records that could not be embedded or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistencePolicy {
    /// Any failed record fails the stage
    Strict,
    /// Failed records are logged and skipped
    Lenient,
}

/// Outcome of persisting one modality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub persisted: usize,
    pub failed: usize,
}

impl PersistencePolicy {
    /// Apply the policy to a finished batch
    pub fn check(self, stage: IngestStage, summary: PersistSummary) -> Result<(), IngestError> {
        if summary.failed == 0 {
            return Ok(());
        }
        let total = summary.persisted + summary.failed;
        match self {
            Self::Strict => Err(IngestError::Persistence {
                stage,
                message: format!("{} of {} records could not be stored", summary.failed, total),
            }),
            Self::Lenient => {
                warn!(
                    "{}: skipped {} of {} records",
                    stage, summary.failed, total
                );
                Ok(())
            }
        }
    }
}
