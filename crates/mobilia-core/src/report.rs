//! Per-item result aggregation for the ingestion pipeline.
//!
//! Each stage records one [`ItemOutcome`] per row/page/record/image
//! instead of logging ad hoc at every failure site. The orchestrator
//! folds the stage reports into a single [`JobReport`], the only
//! job-level diagnostic surfaced to callers.

use serde::{Deserialize, Serialize};

/// Outcome of processing one item (a row chunk, a page, a record, an image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemOutcome {
    /// The item was processed; `label` identifies it (e.g. "row 12").
    Success { label: String },
    /// The item was skipped or failed non-fatally.
    Failure { label: String, error: String },
}

impl ItemOutcome {
    pub fn success(label: impl Into<String>) -> Self {
        Self::Success {
            label: label.into(),
        }
    }

    pub fn failure(label: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Failure {
            label: label.into(),
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Aggregated outcomes for one pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl StageReport {
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failure messages, for logging at stage end.
    pub fn failures(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Failure { error, .. } => Some(error.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Job-level report returned by the orchestrator after a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobReport {
    /// Records persisted from the primary extraction.
    pub records_persisted: usize,
    /// Candidates dropped by validation.
    pub records_dropped: usize,
    /// Images found inside the source container.
    pub images_extracted: usize,
    /// Associations confirmed by the vision service.
    pub associations_confirmed: usize,
    /// Associations made by the singleton positional fallback.
    pub associations_fallback: usize,
    /// Records whose price was updated by fusion.
    pub prices_fused: usize,
    /// Records that received a text embedding.
    pub embeddings_stored: usize,
    /// Non-fatal per-item failures across all stages.
    pub item_failures: usize,
}

impl JobReport {
    /// Total image associations made, regardless of confidence path.
    pub fn associations_total(&self) -> usize {
        self.associations_confirmed + self.associations_fallback
    }

    /// Fold a stage report's failure count into the job totals.
    pub fn absorb_failures(&mut self, stage: &StageReport) {
        self.item_failures += stage.failed();
    }
}
