//! Reconciliation worker pool.
//!
//! Confirmed uploads are dispatched here fire-and-forget; the HTTP
//! handler never awaits the outcome. Each job drives the full commit
//! pass for one upload and records the result (or the failure) on the
//! upload row. Rows within a job are processed strictly in file order;
//! parallelism exists only across independent uploads.

use crate::config::WorkerConfig;
use crate::services::database::Database;
use crate::services::{metrics, uploads};
use platform_core::error::AppError;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReconcileJob {
    pub upload_id: Uuid,
    pub node_id: Uuid,
    pub user_id: String,
    /// Row indexes selected at confirm time; `None` commits every
    /// committable row.
    pub selected_rows: Option<Vec<usize>>,
}

pub struct WorkerOrchestrator {
    config: WorkerConfig,
    db: Database,
    job_tx: mpsc::Sender<ReconcileJob>,
    job_rx: Option<mpsc::Receiver<ReconcileJob>>,
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new(config: WorkerConfig, db: Database) -> (Self, mpsc::Sender<ReconcileJob>) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size);
        let shutdown_token = CancellationToken::new();

        let orchestrator = Self {
            config,
            db,
            job_tx: job_tx.clone(),
            job_rx: Some(job_rx),
            shutdown_token,
        };

        (orchestrator, job_tx)
    }

    pub async fn start(mut self) {
        if !self.config.enabled {
            tracing::info!("Reconciliation worker pool disabled by configuration");
            return;
        }

        let mut job_rx = self.job_rx.take().expect("start() can only be called once");

        tracing::info!(
            worker_count = self.config.worker_count,
            "Starting reconciliation worker pool"
        );

        let mut workers = Vec::new();
        for worker_id in 0..self.config.worker_count {
            workers.push(Worker {
                id: worker_id,
                db: self.db.clone(),
            });
        }

        let shutdown = self.shutdown_token.clone();

        // Single distributor task; jobs fan out round-robin. An upload is
        // locked before its job is enqueued, so two workers never touch
        // the same upload.
        tokio::spawn(async move {
            let mut next_worker = 0;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Job distributor shutting down");
                        break;
                    }
                    job = job_rx.recv() => {
                        match job {
                            Some(job) => {
                                let worker = &workers[next_worker];
                                next_worker = (next_worker + 1) % workers.len();

                                tracing::info!(
                                    worker_id = worker.id,
                                    upload_id = %job.upload_id,
                                    "Dispatching reconciliation job"
                                );

                                let worker_clone = worker.clone();
                                tokio::spawn(async move {
                                    worker_clone.process_job(job).await;
                                });
                            }
                            None => {
                                tracing::info!("Channel closed, job distributor exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    pub fn enqueue(&self, job: ReconcileJob) -> Result<(), AppError> {
        self.job_tx
            .try_send(job)
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("Reconciliation queue full")))
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating worker pool shutdown");
        self.shutdown_token.cancel();
    }
}

#[derive(Clone)]
struct Worker {
    id: usize,
    db: Database,
}

impl Worker {
    async fn process_job(&self, job: ReconcileJob) {
        let start = Instant::now();

        tracing::info!(
            worker_id = self.id,
            upload_id = %job.upload_id,
            "Reconciliation started"
        );

        match uploads::commit_upload(
            &self.db,
            job.node_id,
            job.upload_id,
            job.selected_rows.clone(),
            &job.user_id,
        )
        .await
        {
            Ok(result) => {
                tracing::info!(
                    worker_id = self.id,
                    upload_id = %job.upload_id,
                    farmers_added = result.farmers_added,
                    farmers_updated = result.farmers_updated,
                    transactions_added = result.transactions_added,
                    row_errors = result.errors.len(),
                    duration_ms = start.elapsed().as_millis(),
                    "Reconciliation succeeded"
                );
            }
            Err(e) => {
                metrics::record_error("reconcile_job");
                tracing::error!(
                    worker_id = self.id,
                    upload_id = %job.upload_id,
                    error = %e,
                    "Reconciliation failed"
                );

                if let Err(store_err) = self
                    .db
                    .set_upload_error(job.upload_id, &e.to_string())
                    .await
                {
                    tracing::error!(
                        upload_id = %job.upload_id,
                        error = %store_err,
                        "Failed to record reconciliation failure"
                    );
                }
            }
        }
    }
}
