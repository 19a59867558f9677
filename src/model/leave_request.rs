use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::{ConflictReason, WorkflowError};

pub type LeaveId = u64;
pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Personal,
    Compensatory,
    Annual,
}

/// Stored status of a leave request. The numeric codes are the ones clients
/// filter by (`apply_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveStatus {
    PendingReview,
    InReview,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn code(self) -> u8 {
        match self {
            LeaveStatus::PendingReview => 1,
            LeaveStatus::InReview => 2,
            LeaveStatus::Approved => 3,
            LeaveStatus::Rejected => 4,
            LeaveStatus::Cancelled => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LeaveStatus::PendingReview),
            2 => Some(LeaveStatus::InReview),
            3 => Some(LeaveStatus::Approved),
            4 => Some(LeaveStatus::Rejected),
            5 => Some(LeaveStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, LeaveStatus::PendingReview | LeaveStatus::InReview)
    }
}

/// Where a request sits in its approval chain.
///
/// `step` is kept on the terminal variants only as information about where
/// the request stopped; nothing acts on it once the request is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Open { step: usize },
    Approved { step: usize },
    Rejected { step: usize },
    Cancelled { step: usize },
}

impl ApprovalState {
    pub fn status(self) -> LeaveStatus {
        match self {
            ApprovalState::Open { step: 0 } => LeaveStatus::PendingReview,
            ApprovalState::Open { .. } => LeaveStatus::InReview,
            ApprovalState::Approved { .. } => LeaveStatus::Approved,
            ApprovalState::Rejected { .. } => LeaveStatus::Rejected,
            ApprovalState::Cancelled { .. } => LeaveStatus::Cancelled,
        }
    }

    pub fn step(self) -> usize {
        match self {
            ApprovalState::Open { step }
            | ApprovalState::Approved { step }
            | ApprovalState::Rejected { step }
            | ApprovalState::Cancelled { step } => step,
        }
    }

    /// Rebuilds the state from its stored (status, step) columns.
    pub fn from_parts(status: LeaveStatus, step: usize, chain_len: usize) -> Result<Self, String> {
        if step >= chain_len {
            return Err(format!(
                "current step {} is outside an approval chain of {}",
                step, chain_len
            ));
        }
        match status {
            LeaveStatus::PendingReview if step == 0 => Ok(ApprovalState::Open { step }),
            LeaveStatus::PendingReview => Err(format!("pending review at step {}", step)),
            LeaveStatus::InReview if step > 0 => Ok(ApprovalState::Open { step }),
            LeaveStatus::InReview => Err("in review at step 0".to_string()),
            LeaveStatus::Approved => Ok(ApprovalState::Approved { step }),
            LeaveStatus::Rejected => Ok(ApprovalState::Rejected { step }),
            LeaveStatus::Cancelled => Ok(ApprovalState::Cancelled { step }),
        }
    }
}

/// Inclusive range of leave days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start: NaiveDate,
    #[schema(example = "2026-01-06", format = "date", value_type = String)]
    pub end: NaiveDate,
}

/// Snapshot of a department approver taken when a request is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Approver {
    #[schema(example = 10)]
    pub user_id: UserId,
    #[schema(example = "jane")]
    pub user_name: String,
    #[serde(default)]
    #[schema(example = "jane@company.com", nullable = true)]
    pub email: Option<String>,
}

/// Snapshot of the submitter, frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Applicant {
    #[schema(example = 1000)]
    pub user_id: UserId,
    #[schema(example = "john")]
    pub user_name: String,
    #[schema(example = "Engineering", nullable = true)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    Created,
    Cancelled,
    Approved,
    FinalApproved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub actor: Actor,
    pub action: AuditAction,
    pub description: String,
    #[schema(nullable = true)]
    pub remark: Option<String>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub at: DateTime<Utc>,
}

/// What a caller asks to do with an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Cancel,
}

/// The (status, step) pair a conditional write is guarded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub status: LeaveStatus,
    pub step: usize,
}

/// A validated state change, ready to be written against `expected`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub expected: Revision,
    pub next: ApprovalState,
    /// `approval_chain[next.step()]`, denormalized for the store.
    pub current_approver: Approver,
    pub entry: AuditEntry,
}

#[derive(Debug, Clone)]
pub struct LeaveRequest {
    pub id: LeaveId,
    pub apply_number: String,
    pub leave_type: LeaveType,
    pub leave_dates: Vec<DateRange>,
    pub leave_length: f64,
    pub reason: String,
    pub applicant: Applicant,
    pub approval_chain: Vec<Approver>,
    pub state: ApprovalState,
    pub audit_log: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn status(&self) -> LeaveStatus {
        self.state.status()
    }

    pub fn current_step(&self) -> usize {
        self.state.step()
    }

    pub fn current_approver(&self) -> Option<&Approver> {
        self.approval_chain.get(self.state.step())
    }

    pub fn revision(&self) -> Revision {
        Revision {
            status: self.status(),
            step: self.current_step(),
        }
    }

    /// Applicant or any approver on the chain.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.applicant.user_id == user_id || self.approval_chain.iter().any(|a| a.user_id == user_id)
    }

    /// Checks `decision` against this snapshot and returns the transition to
    /// write. Nothing is mutated here.
    pub fn decide(
        &self,
        actor: &Actor,
        decision: Decision,
        remark: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let step = match self.state {
            ApprovalState::Open { step } => step,
            closed => {
                return Err(WorkflowError::StateConflict(ConflictReason::AlreadyTerminal(
                    closed.status(),
                )));
            }
        };

        let (next, action, description) = match decision {
            Decision::Cancel => {
                if actor.user_id != self.applicant.user_id {
                    return Err(WorkflowError::Authorization(
                        "only the applicant can cancel a leave request".to_string(),
                    ));
                }
                (
                    ApprovalState::Cancelled { step },
                    AuditAction::Cancelled,
                    format!("{} cancelled the request", actor.user_name),
                )
            }
            Decision::Approve | Decision::Reject => {
                let expected = self.approval_chain.get(step).map(|a| a.user_id);
                if expected != Some(actor.user_id) {
                    return Err(WorkflowError::Authorization(format!(
                        "user {} is not the current approver of {}",
                        actor.user_id, self.apply_number
                    )));
                }
                match decision {
                    Decision::Reject => (
                        ApprovalState::Rejected { step },
                        AuditAction::Rejected,
                        format!("{} rejected the request", actor.user_name),
                    ),
                    _ if step + 1 < self.approval_chain.len() => (
                        ApprovalState::Open { step: step + 1 },
                        AuditAction::Approved,
                        format!(
                            "{} approved step {} of {}, handed to {}",
                            actor.user_name,
                            step + 1,
                            self.approval_chain.len(),
                            self.approval_chain[step + 1].user_name
                        ),
                    ),
                    _ => (
                        ApprovalState::Approved { step },
                        AuditAction::FinalApproved,
                        format!("{} gave final approval", actor.user_name),
                    ),
                }
            }
        };

        let current_approver = self.approval_chain.get(next.step()).cloned().ok_or_else(|| {
            WorkflowError::Dependency(format!(
                "{} has no approver at step {}",
                self.apply_number,
                next.step()
            ))
        })?;

        Ok(Transition {
            expected: self.revision(),
            next,
            current_approver,
            entry: AuditEntry {
                actor: actor.clone(),
                action,
                description,
                remark,
                at,
            },
        })
    }

    /// Folds an already-persisted transition into this snapshot.
    pub fn apply(&mut self, transition: Transition) {
        self.state = transition.next;
        self.updated_at = transition.entry.at;
        self.audit_log.push(transition.entry);
    }
}
