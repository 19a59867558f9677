//! Record store seam for leave requests.
//!
//! The workflow engine only talks to [`LeaveStore`]. Every mutation after
//! creation goes through [`LeaveStore::conditional_update`], which must apply
//! the change only when the stored (status, step) still equals the revision
//! the caller validated against.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;

use crate::model::leave_request::{
    Applicant, ApprovalState, Approver, AuditEntry, DateRange, LeaveId, LeaveRequest,
    LeaveStatus, LeaveType, Transition, UserId,
};

pub use memory::MemoryLeaveStore;
pub use mysql::MySqlLeaveStore;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "apply number {} is already taken", _0)]
    DuplicateApplyNumber(String),
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "stored leave request is malformed: {}", _0)]
    Corrupt(String),
    #[display(fmt = "in-memory store lock poisoned")]
    Poisoned,
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Conflict,
}

/// Everything a new request carries apart from its number and store id.
#[derive(Debug, Clone)]
pub struct LeaveDraft {
    pub leave_type: LeaveType,
    pub leave_dates: Vec<DateRange>,
    pub leave_length: f64,
    pub reason: String,
    pub applicant: Applicant,
    pub approval_chain: Vec<Approver>,
    pub created: AuditEntry,
}

#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub apply_number: String,
    pub draft: LeaveDraft,
}

impl NewLeaveRequest {
    /// The record as it looks right after insertion.
    pub fn into_request(self, id: LeaveId) -> LeaveRequest {
        let NewLeaveRequest { apply_number, draft } = self;
        let created_at = draft.created.at;
        LeaveRequest {
            id,
            apply_number,
            leave_type: draft.leave_type,
            leave_dates: draft.leave_dates,
            leave_length: draft.leave_length,
            reason: draft.reason,
            applicant: draft.applicant,
            approval_chain: draft.approval_chain,
            state: ApprovalState::Open { step: 0 },
            audit_log: vec![draft.created],
            created_at,
            updated_at: created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    /// PendingReview or InReview.
    Open,
    Exact(LeaveStatus),
}

impl StatusFilter {
    pub fn matches(self, status: LeaveStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Open => status.is_open(),
            StatusFilter::Exact(s) => s == status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyFilter {
    Anyone,
    Applicant(UserId),
    /// Open requests waiting on this user, plus closed requests that had this
    /// user anywhere on their chain.
    Auditor(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveFilter {
    pub status: StatusFilter,
    pub party: PartyFilter,
}

impl LeaveFilter {
    pub fn matches(&self, request: &LeaveRequest) -> bool {
        if !self.status.matches(request.status()) {
            return false;
        }
        match self.party {
            PartyFilter::Anyone => true,
            PartyFilter::Applicant(user_id) => request.applicant.user_id == user_id,
            PartyFilter::Auditor(user_id) => {
                if request.status().is_open() {
                    request.current_approver().map(|a| a.user_id) == Some(user_id)
                } else {
                    request.approval_chain.iter().any(|a| a.user_id == user_id)
                }
            }
        }
    }
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn get(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError>;

    /// Inserts the record together with its creation audit entry.
    /// Fails with [`StoreError::DuplicateApplyNumber`] when the number is taken.
    async fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError>;

    /// Writes `transition` and appends its audit entry if, and only if, the
    /// stored revision still equals `transition.expected`.
    async fn conditional_update(
        &self,
        id: LeaveId,
        transition: &Transition,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn count(&self, filter: &LeaveFilter) -> Result<u64, StoreError>;

    /// Matching records in creation order.
    async fn find(
        &self,
        filter: &LeaveFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError>;

    /// Atomically bumps and returns the per-day counter (first call yields 1).
    async fn next_daily_sequence(&self, day: NaiveDate) -> Result<u64, StoreError>;

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;
}
