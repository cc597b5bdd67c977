//! Outbound sync dispatch.
//!
//! # Responsibility
//! - Drain due queue entries through a [`SyncTransport`].
//! - Apply push outcomes: complete, retry with exponential backoff, or fail.
//!
//! # Invariants
//! - A conflict is never retried; the operation fails and the local row is
//!   flagged `failed` so the server copy wins on the next pull.
//! - Retryable errors are retried while `retry_count < max_retries`.
//! - Abandoned `in_progress` entries are returned to `pending` before claiming.
//! - A settle error on one operation is counted and skipped; the rest of the
//!   batch is still pushed.
//! - Log lines carry ids and counters only, never payloads.

use crate::clock::now_epoch_ms;
use crate::model::sync::{SyncOperation, SyncStatus};
use crate::repo::sync_queue_repo::SyncQueueRepository;
use crate::repo::RepoError;
use crate::sync::config::{SyncConfig, SyncConfigError};
use crate::sync::transport::{
    is_valid_transport_id, SyncPushRequest, SyncTransport, SyncTransportError,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for sync dispatch.
#[derive(Debug)]
pub enum SyncServiceError {
    InvalidConfig(SyncConfigError),
    InvalidTransportId(String),
    Repo(RepoError),
}

impl Display for SyncServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(err) => write!(f, "{err}"),
            Self::InvalidTransportId(value) => write!(f, "transport id is invalid: {value}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvalidTransportId(_) => None,
        }
    }
}

impl From<RepoError> for SyncServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<SyncConfigError> for SyncServiceError {
    fn from(value: SyncConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

/// What happened to one claimed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDisposition {
    Completed,
    Retried { next_attempt_at: i64 },
    Failed,
    Conflict,
}

/// Counters for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRunReport {
    pub reset_stale: usize,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub conflicts: usize,
    /// Pushed operations whose outcome could not be stored, e.g. after another
    /// claimer reset the claim.
    pub skipped: usize,
}

impl SyncRunReport {
    /// True when any claimed operation did not complete.
    pub fn has_errors(&self) -> bool {
        self.retried + self.failed + self.conflicts + self.skipped > 0
    }

    fn tally(&mut self, disposition: SyncDisposition) {
        match disposition {
            SyncDisposition::Completed => self.completed += 1,
            SyncDisposition::Retried { .. } => self.retried += 1,
            SyncDisposition::Failed => self.failed += 1,
            SyncDisposition::Conflict => self.conflicts += 1,
        }
    }
}

/// Sync dispatcher over a queue repository and a host transport.
pub struct SyncService<Q: SyncQueueRepository, T: SyncTransport> {
    queue: Q,
    transport: T,
    config: SyncConfig,
}

impl<Q: SyncQueueRepository, T: SyncTransport> SyncService<Q, T> {
    pub fn new(queue: Q, transport: T, config: SyncConfig) -> Result<Self, SyncServiceError> {
        config.validate()?;
        let transport_id = transport.transport_id().trim();
        if !is_valid_transport_id(transport_id) {
            return Err(SyncServiceError::InvalidTransportId(transport_id.to_string()));
        }
        Ok(Self {
            queue,
            transport,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one dispatch pass at the current wall-clock time.
    pub fn run_once(&self) -> Result<SyncRunReport, SyncServiceError> {
        self.run_once_at(now_epoch_ms())
    }

    /// Runs one dispatch pass as of `now_ms`.
    pub fn run_once_at(&self, now_ms: i64) -> Result<SyncRunReport, SyncServiceError> {
        let (reset_stale, batch) = claim_batch(&self.queue, &self.config, now_ms)?;
        let mut report = SyncRunReport {
            reset_stale,
            claimed: batch.len(),
            ..SyncRunReport::default()
        };

        for op in &batch {
            let request = SyncPushRequest::from_operation(op);
            let outcome = self.transport.push(&request);
            match apply_outcome(&self.queue, &self.config, op, outcome, now_ms) {
                Ok(disposition) => report.tally(disposition),
                Err(err) => {
                    report.skipped += 1;
                    warn!(
                        "event=sync_settle module=sync status=error op_id={} error={err}",
                        op.id
                    );
                }
            }
        }

        info!(
            "event=sync_run module=sync status={} transport={} reset_stale={} claimed={} completed={} retried={} failed={} conflicts={} skipped={}",
            if report.has_errors() { "partial" } else { "ok" },
            self.transport.transport_id(),
            report.reset_stale,
            report.claimed,
            report.completed,
            report.retried,
            report.failed,
            report.conflicts,
            report.skipped
        );
        Ok(report)
    }

    /// Applies an outcome for an operation pushed outside [`Self::run_once`].
    pub fn report_outcome(
        &self,
        op: &SyncOperation,
        outcome: Result<(), SyncTransportError>,
        now_ms: i64,
    ) -> Result<SyncDisposition, SyncServiceError> {
        apply_outcome(&self.queue, &self.config, op, outcome, now_ms)
    }

    /// Re-arms failed operations after the user asks to retry.
    pub fn retry_failed(&self) -> Result<usize, SyncServiceError> {
        let count = self.queue.retry_failed(now_epoch_ms())?;
        info!("event=sync_retry_failed module=sync status=ok count={count}");
        Ok(count)
    }

    pub fn pending_count(&self) -> Result<u64, SyncServiceError> {
        Ok(self.queue.count_by_status(SyncStatus::Pending)?)
    }
}

/// Resets stale claims, then claims the next due batch.
///
/// Returns `(reset_stale, claimed)`.
pub fn claim_batch<Q: SyncQueueRepository>(
    queue: &Q,
    config: &SyncConfig,
    now_ms: i64,
) -> Result<(usize, Vec<SyncOperation>), SyncServiceError> {
    let stale_after = i64::try_from(config.stale_after_ms).unwrap_or(i64::MAX);
    let reset = queue.reset_stale(now_ms.saturating_sub(stale_after))?;
    if reset > 0 {
        warn!("event=sync_reset_stale module=sync status=reset count={reset}");
    }
    let batch = queue.claim_due(now_ms, config.batch_size)?;
    Ok((reset, batch))
}

/// Settles one claimed operation according to the push outcome.
pub fn apply_outcome<Q: SyncQueueRepository>(
    queue: &Q,
    config: &SyncConfig,
    op: &SyncOperation,
    outcome: Result<(), SyncTransportError>,
    now_ms: i64,
) -> Result<SyncDisposition, SyncServiceError> {
    let err = match outcome {
        Ok(()) => {
            queue.mark_completed(op.id)?;
            return Ok(SyncDisposition::Completed);
        }
        Err(err) => err,
    };

    if err.conflict {
        queue.mark_failed(op.id, &format!("conflict: {err}"))?;
        warn!(
            "event=sync_push module=sync status=conflict op_id={} entity_type={} code={}",
            op.id,
            op.entity_type.as_str(),
            err.code
        );
        return Ok(SyncDisposition::Conflict);
    }

    if err.retryable && op.retry_count < config.max_retries {
        let delay = i64::try_from(config.backoff_ms(op.retry_count)).unwrap_or(i64::MAX);
        let next_attempt_at = now_ms.saturating_add(delay);
        queue.schedule_retry(
            op.id,
            op.retry_count.saturating_add(1),
            next_attempt_at,
            &err.to_string(),
        )?;
        warn!(
            "event=sync_push module=sync status=retry op_id={} retry_count={} code={}",
            op.id,
            op.retry_count.saturating_add(1),
            err.code
        );
        return Ok(SyncDisposition::Retried { next_attempt_at });
    }

    queue.mark_failed(op.id, &err.to_string())?;
    warn!(
        "event=sync_push module=sync status=failed op_id={} retry_count={} code={}",
        op.id, op.retry_count, err.code
    );
    Ok(SyncDisposition::Failed)
}

#[cfg(test)]
mod tests {
    use super::{SyncDisposition, SyncRunReport};

    #[test]
    fn report_flags_any_non_completion() {
        let mut report = SyncRunReport::default();
        report.tally(SyncDisposition::Completed);
        assert!(!report.has_errors());

        report.tally(SyncDisposition::Retried { next_attempt_at: 1 });
        assert!(report.has_errors());
        assert_eq!(report.completed, 1);
        assert_eq!(report.retried, 1);
    }

    #[test]
    fn skipped_settles_count_as_errors() {
        let report = SyncRunReport {
            skipped: 1,
            ..SyncRunReport::default()
        };
        assert!(report.has_errors());
    }
}
