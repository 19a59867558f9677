use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use strum_macros::EnumString;
use tracing::warn;

use crate::error::{ConflictReason, WorkflowError};
use crate::model::leave_request::LeaveRequest;
use crate::store::{LeaveDraft, LeaveStore, NewLeaveRequest, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NumberingStrategy {
    /// Per-day counter record bumped atomically by the store.
    #[default]
    Counter,
    /// One more than the requests created since local midnight; a clash on
    /// the unique number is retried with a fresh count.
    DayCount,
}

/// Issues `{prefix}-{yyyymmdd}{n}` apply numbers and inserts the request
/// under one, retrying while the store reports the number as taken.
#[derive(Debug, Clone)]
pub struct RequestNumbering {
    prefix: String,
    strategy: NumberingStrategy,
    max_attempts: u32,
}

impl RequestNumbering {
    pub fn new(prefix: impl Into<String>, strategy: NumberingStrategy, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            strategy,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn format(&self, day: NaiveDate, n: u64) -> String {
        format!("{}-{}{}", self.prefix, day.format("%Y%m%d"), n)
    }

    async fn next_sequence(
        &self,
        store: &dyn LeaveStore,
        now: DateTime<Local>,
    ) -> Result<u64, StoreError> {
        let day = now.date_naive();
        match self.strategy {
            NumberingStrategy::Counter => store.next_daily_sequence(day).await,
            NumberingStrategy::DayCount => {
                let since = local_midnight(now);
                Ok(store.count_created_since(since).await? + 1)
            }
        }
    }

    pub async fn create_numbered(
        &self,
        store: &dyn LeaveStore,
        draft: LeaveDraft,
        now: DateTime<Local>,
    ) -> Result<LeaveRequest, WorkflowError> {
        for attempt in 1..=self.max_attempts {
            let n = self.next_sequence(store, now).await?;
            let apply_number = self.format(now.date_naive(), n);
            let new = NewLeaveRequest {
                apply_number,
                draft: draft.clone(),
            };

            match store.create(new).await {
                Ok(request) => return Ok(request),
                Err(StoreError::DuplicateApplyNumber(taken)) => {
                    warn!(apply_number = %taken, attempt, "Apply number already taken, renumbering");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WorkflowError::StateConflict(ConflictReason::NumberingExhausted(
            self.max_attempts,
        )))
    }
}

fn local_midnight(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|midnight| midnight.with_timezone(&Utc))
        // No local midnight on this day (DST gap): count from the start of
        // the UTC day instead.
        .unwrap_or_else(|| now.date_naive().and_time(NaiveTime::MIN).and_utc())
}
