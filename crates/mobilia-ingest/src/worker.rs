//! Fire-and-forget job execution with a broadcast event bus.
//!
//! `submit` validates the request, persists the pending job, and
//! returns its ID immediately; the run itself happens on a spawned
//! task. Callers observe progress by subscribing to [`WorkerEvent`]s.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use mobilia_core::defaults::EVENT_BUS_CAPACITY;
use mobilia_core::{IngestRequest, JobReport, Result};

use crate::pipeline::IngestPipeline;

/// Events emitted by the ingest worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was accepted and its run spawned.
    JobStarted { job_id: Uuid, catalog_id: Uuid },
    /// A job ran to completion.
    JobCompleted { job_id: Uuid, report: JobReport },
    /// A job failed fatally.
    JobFailed { job_id: Uuid, error: String },
}

/// Executes ingestion jobs in the background.
pub struct IngestWorker {
    pipeline: Arc<IngestPipeline>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl IngestWorker {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { pipeline, event_tx }
    }

    /// Subscribe to worker events. Each receiver sees events sent after
    /// it subscribed; a slow receiver may observe lag, never a stall.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Accept a submission, persist its job, and spawn the run.
    ///
    /// Returns the job ID as soon as the job exists; the outcome
    /// arrives on the event bus. Rejections (an unsupported file type,
    /// a store failure) surface here synchronously.
    pub async fn submit(&self, request: IngestRequest) -> Result<Uuid> {
        let job = self.pipeline.create_job(&request).await?;
        let job_id = job.id;

        // Send errors only mean nobody is listening right now.
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            catalog_id: job.catalog_id,
        });

        let pipeline = self.pipeline.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            match pipeline.run(&job).await {
                Ok(report) => {
                    debug!(component = "worker", job_id = %job_id, "Run task finished");
                    let _ = event_tx.send(WorkerEvent::JobCompleted { job_id, report });
                }
                Err(e) => {
                    let _ = event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        error: e.to_string(),
                    });
                }
            }
        });

        info!(
            component = "worker",
            job_id = %job_id,
            catalog_id = %request.catalog_id,
            "Job submitted"
        );
        Ok(job_id)
    }
}
