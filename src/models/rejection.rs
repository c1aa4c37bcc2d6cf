//! # Rejection Record
//!
//! Structured report handed to the notification sink of the originating provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IngestionTask, Rule, Violation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub object_ref: String,
    pub provider_id: String,
    pub violations: Vec<Violation>,
    pub attempted_at: DateTime<Utc>,
    pub delivery_count: u32,
}

impl RejectionRecord {
    pub fn for_task(task: &IngestionTask, violations: Vec<Violation>) -> Self {
        Self {
            object_ref: task.object_ref.to_string(),
            provider_id: task.provider_id(),
            violations,
            attempted_at: Utc::now(),
            delivery_count: task.delivery_count,
        }
    }

    /// Rejection for a task whose transient failures outlived the redrive threshold
    pub fn delivery_exhausted(task: &IngestionTask, last_error: &str) -> Self {
        Self::for_task(
            task,
            vec![Violation::new(
                "$",
                Rule::DeliveryExhausted,
                format!(
                    "delivery {} failed transiently: {last_error}",
                    task.delivery_count
                ),
            )],
        )
    }

    pub fn is_exhaustion(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.rule == Rule::DeliveryExhausted)
    }
}
