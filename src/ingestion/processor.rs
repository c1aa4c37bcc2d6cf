//! # Task Processor
//!
//! Carries one [`IngestionTask`] through fetch, validate, write, invalidate, and
//! dead-letter, and reduces the result to a [`TaskDisposition`] the consumer can act on
//! without looking at errors.
//!
//! ```text
//! fetch ──NotFound──────────────────────────────> reject(object-missing)   => Rejected
//!   │ transient ───────────────────────────────────────────────────────────=> Retry
//!   v
//! validate ─> accepted subset ─> write ─> invalidate ─┐
//!         └─> rejected subset ─────────> reject ──────┴> Completed | Rejected
//! ```
//!
//! [`TaskProcessor::evaluate`] leaves a rejection pending on the outcome so a consumer
//! can hold it back until every task of the message is terminal; [`TaskProcessor::process`]
//! publishes it straight away.
//!
//! A transient failure on the final allowed delivery also publishes a
//! `delivery-exhausted` rejection; the message itself is still left for the queue's own
//! dead-letter transition.

use std::fmt;

use tracing::{debug, warn};

use super::cache_sync::CacheSynchronizer;
use super::dead_letter::DeadLetterRouter;
use super::fetcher::PayloadFetcher;
use super::validator::{RecordSource, RecordValidator};
use super::writer::{IdempotentWriter, WriteSummary};
use crate::cache::{CacheProvider, CacheService};
use crate::error::{CatalogError, Result};
use crate::logging::{log_error, log_ingestion_operation};
use crate::models::{IngestionTask, RejectionRecord, Rule, Violation};

/// What the consumer should do with a task's message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskDisposition {
    /// Every record was written (or already present)
    Completed,
    /// Some or all of the payload was rejected and reported; accepted records were written
    Rejected,
    /// Transient failure; leave the message for redelivery
    Retry,
}

impl TaskDisposition {
    /// Terminal dispositions allow the message to be acknowledged
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskDisposition::Retry)
    }
}

impl fmt::Display for TaskDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskDisposition::Completed => write!(f, "completed"),
            TaskDisposition::Rejected => write!(f, "rejected"),
            TaskDisposition::Retry => write!(f, "retry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub disposition: TaskDisposition,
    pub writes: Option<WriteSummary>,
    /// Violations to report; unpublished when returned by `evaluate`
    pub rejection: Option<RejectionRecord>,
    /// Failure that caused a retry
    pub error: Option<String>,
    /// A delivery-exhausted notification was published for this attempt
    pub exhausted: bool,
}

impl TaskOutcome {
    fn finished(writes: Option<WriteSummary>, rejection: Option<RejectionRecord>) -> Self {
        let disposition = if rejection.is_some() {
            TaskDisposition::Rejected
        } else {
            TaskDisposition::Completed
        };
        Self {
            disposition,
            writes,
            rejection,
            error: None,
            exhausted: false,
        }
    }

    fn retry(error: &CatalogError, exhausted: bool) -> Self {
        Self {
            disposition: TaskDisposition::Retry,
            writes: None,
            rejection: None,
            error: Some(error.to_string()),
            exhausted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskProcessor<C: CacheService = CacheProvider> {
    fetcher: PayloadFetcher,
    validator: RecordValidator,
    writer: IdempotentWriter,
    synchronizer: CacheSynchronizer<C>,
    router: DeadLetterRouter,
    /// Deliveries the queue allows before its own dead-letter transition
    max_receive_count: u32,
}

impl<C: CacheService> TaskProcessor<C> {
    pub fn new(
        fetcher: PayloadFetcher,
        validator: RecordValidator,
        writer: IdempotentWriter,
        synchronizer: CacheSynchronizer<C>,
        router: DeadLetterRouter,
        max_receive_count: u32,
    ) -> Self {
        Self {
            fetcher,
            validator,
            writer,
            synchronizer,
            router,
            max_receive_count,
        }
    }

    pub fn router(&self) -> &DeadLetterRouter {
        &self.router
    }

    /// True when the queue will not deliver a message again after this attempt
    pub fn is_final_delivery(&self, delivery_count: u32) -> bool {
        delivery_count >= self.max_receive_count
    }

    /// Run the task and publish its rejection, if any
    pub async fn process(&self, task: &IngestionTask) -> TaskOutcome {
        let outcome = self.evaluate(task).await;
        match self.publish_rejection(&outcome).await {
            Ok(()) => outcome,
            Err(error) => self.on_transient_failure(task, error).await,
        }
    }

    /// Run the task, leaving any rejection unpublished on the outcome
    pub async fn evaluate(&self, task: &IngestionTask) -> TaskOutcome {
        match self.run(task).await {
            Ok(outcome) => {
                log_ingestion_operation(
                    "process_task",
                    &task.object_ref.to_string(),
                    Some(&task.provider_id()),
                    &outcome.disposition.to_string(),
                    None,
                );
                outcome
            }
            Err(error) => self.on_transient_failure(task, error).await,
        }
    }

    pub async fn publish_rejection(&self, outcome: &TaskOutcome) -> Result<()> {
        match &outcome.rejection {
            Some(rejection) => self.router.deliver(rejection).await,
            None => Ok(()),
        }
    }

    async fn run(&self, task: &IngestionTask) -> Result<TaskOutcome> {
        let fetched = match self.fetcher.fetch(&task.object_ref).await {
            Ok(fetched) => fetched,
            Err(e) if !e.is_transient() => {
                let rejection = RejectionRecord::for_task(
                    task,
                    vec![Violation::new("$", Rule::ObjectMissing, e.to_string())],
                );
                return Ok(TaskOutcome::finished(None, Some(rejection)));
            }
            Err(e) => return Err(e),
        };

        let source = RecordSource {
            provider_id: task.provider_id(),
            source_object: task.object_ref.to_string(),
            fallback_ingested_at: fetched.last_modified,
        };
        let report = self.validator.validate(&fetched.bytes, &source);

        let writes = if report.accepted.is_empty() {
            None
        } else {
            let summary = self.writer.write(&report.accepted).await?;
            let scopes = self.synchronizer.invalidate(&summary).await?;
            debug!(
                object_ref = %task.object_ref,
                scopes,
                "Write and invalidation complete"
            );
            Some(summary)
        };

        let rejection = (!report.rejected.is_empty())
            .then(|| RejectionRecord::for_task(task, report.rejected.clone()));

        Ok(TaskOutcome::finished(writes, rejection))
    }

    async fn on_transient_failure(&self, task: &IngestionTask, error: CatalogError) -> TaskOutcome {
        log_error(
            "task_processor",
            "process_task",
            &error.to_string(),
            Some(&task.object_ref.to_string()),
        );

        let final_delivery = self.is_final_delivery(task.delivery_count);
        let exhausted = if final_delivery {
            match self.router.report_exhausted(task, &error).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        object_ref = %task.object_ref,
                        error = %e,
                        "Failed to publish delivery-exhausted notification"
                    );
                    false
                }
            }
        } else {
            false
        };

        TaskOutcome::retry(&error, exhausted)
    }
}
