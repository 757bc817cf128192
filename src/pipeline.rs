use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::{Batch, Batches};
use crate::config::{MigrationConfig, SourceHandle, DEFAULT_BOUNDARY_PREFIX};
use crate::error::{MigrateError, Result, RowError};
use crate::extract::{AccessGrants, Extractor, Page};
use crate::id_mapping::IdMapping;
use crate::load::{Applied, BatchOutcome, LoadCounts, Loader};
use crate::model::MigratedUser;
use crate::transform::{transform, TransformPolicy};

/// Where a run currently is. Stages repeat once per source page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    Extracting,
    Transforming,
    Batching,
    Loading { batch: usize },
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::NotStarted => f.write_str("not started"),
            Stage::Extracting => f.write_str("extracting"),
            Stage::Transforming => f.write_str("transforming"),
            Stage::Batching => f.write_str("batching"),
            Stage::Loading { batch } => write!(f, "loading batch {batch}"),
            Stage::Done => f.write_str("done"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedBatch {
    pub index: usize,
    pub rows: usize,
    /// First source id in the batch, for locating it on retry.
    pub first_source_id: Option<String>,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Source rows seen, including rejected ones.
    pub extracted: usize,
    pub rejected: Vec<RowError>,
    pub committed: Vec<BatchOutcome>,
    pub failed: Vec<FailedBatch>,
}

impl RunSummary {
    /// Rows in batches that were committed or written.
    pub fn migrated(&self) -> usize {
        self.committed.iter().map(|outcome| outcome.rows).sum()
    }

    /// Insert/skip counts over all directly committed batches.
    pub fn totals(&self) -> LoadCounts {
        let mut totals = LoadCounts::default();
        for outcome in &self.committed {
            if let Applied::Committed(counts) = outcome.applied {
                totals.add(counts);
            }
        }
        totals
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|failed| failed.index).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failed.is_empty()
    }
}

/// Drives extraction, transformation, batching and loading for one run.
pub struct Pipeline {
    batch_size: NonZeroUsize,
    batch_timeout: Duration,
    mapping_path: PathBuf,
    mapping: IdMapping,
    grants: AccessGrants,
    policy: TransformPolicy,
    stage: Stage,
}

impl Pipeline {
    /// Loads the ID mapping from the output directory and, when configured,
    /// the access-grant export.
    pub async fn new(config: &MigrationConfig) -> Result<Self> {
        let mapping_path = config.mapping_path();
        let mapping = IdMapping::load(&mapping_path).await?;

        let grants = match &config.access_artifact {
            Some(path) => {
                let prefix = match &config.source {
                    SourceHandle::Artifact {
                        boundary_prefix, ..
                    } => boundary_prefix.as_str(),
                    SourceHandle::Database { .. } => DEFAULT_BOUNDARY_PREFIX,
                };
                AccessGrants::open(path, prefix).await?
            }
            None => AccessGrants::default(),
        };

        Ok(Self {
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout,
            mapping_path,
            mapping,
            grants,
            policy: TransformPolicy {
                email_verified_default: config.email_verified_default,
            },
            stage: Stage::NotStarted,
        })
    }

    pub fn with_grants(mut self, grants: AccessGrants) -> Self {
        self.grants = grants;
        self
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = %self.stage, to = %stage, "Stage transition");
        self.stage = stage;
    }

    /// Runs to completion. Rejected rows and failed batches are collected in
    /// the summary; only extraction and mapping persistence errors abort.
    pub async fn run(
        &mut self,
        extractor: &mut dyn Extractor,
        loader: &mut dyn Loader,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut next_batch = 1;

        loop {
            self.enter(Stage::Extracting);
            let Some(page) = extractor.next_page().await? else {
                break;
            };
            summary.extracted += page.row_count();

            self.enter(Stage::Transforming);
            let migrated = self.transform_page(page, &mut summary.rejected);

            self.enter(Stage::Batching);
            for batch in Batches::new(migrated, self.batch_size).starting_at(next_batch) {
                next_batch = batch.index + 1;
                self.enter(Stage::Loading { batch: batch.index });
                self.load_batch(loader, batch, &mut summary).await?;
            }
        }

        self.enter(Stage::Done);
        tracing::info!(
            extracted = summary.extracted,
            migrated = summary.migrated(),
            rejected = summary.rejected.len(),
            committed = summary.committed.len(),
            failed = summary.failed.len(),
            "Migration finished"
        );
        if !summary.failed.is_empty() {
            tracing::warn!(batches = ?summary.failed_indices(), "Batches need a retry");
        }
        Ok(summary)
    }

    fn transform_page(&self, page: Page, rejected: &mut Vec<RowError>) -> Vec<MigratedUser> {
        for row in &page.rejected {
            tracing::warn!(%row, "Skipping undecodable row");
        }
        // Decoded records fill the positions not taken by undecodable rows.
        let taken: HashSet<usize> = page.rejected.iter().map(|row| row.position).collect();
        let positions = (page.offset as usize..).filter(|position| !taken.contains(position));
        rejected.extend(page.rejected);

        let mut migrated = Vec::with_capacity(page.records.len());
        for (position, record) in positions.zip(&page.records) {
            let access = record.is_active.or_else(|| self.grants.signal(&record.id));
            let user_id = self.mapping.target_id_for(&record.id);
            match transform(position, record, user_id, access, self.policy) {
                Ok(user) => migrated.push(user),
                Err(row) => {
                    tracing::warn!(%row, "Skipping row");
                    rejected.push(row);
                }
            }
        }
        migrated
    }

    async fn load_batch(
        &mut self,
        loader: &mut dyn Loader,
        batch: Batch<MigratedUser>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let secs = self.batch_timeout.as_secs();
        let result = match tokio::time::timeout(self.batch_timeout, loader.apply(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(MigrateError::BatchTimeout {
                batch: batch.index,
                secs,
            }),
        };

        match result {
            Ok(mut outcome) => {
                summary.rejected.append(&mut outcome.rejected);
                let added = outcome
                    .resolved_ids
                    .iter()
                    .filter(|(source, target)| self.mapping.record(source, target))
                    .count();
                if added > 0 {
                    self.mapping.save(&self.mapping_path).await?;
                }
                tracing::debug!(batch = batch.index, added, "ID mapping checkpoint");
                summary.committed.push(outcome);
            }
            Err(e) => {
                tracing::error!(batch = batch.index, rows = batch.len(), error = %e, "Batch failed");
                summary.failed.push(FailedBatch {
                    index: batch.index,
                    rows: batch.len(),
                    first_source_id: batch.items.first().map(|item| item.source_id.clone()),
                    error: e.to_string(),
                });
            }
        }
        Ok(())
    }
}
