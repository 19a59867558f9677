use strum_macros::EnumString;
use tracing::debug;

use crate::directory::Directory;
use crate::error::WorkflowError;
use crate::model::leave_request::{Approver, UserId};

/// Which of the submitter's departments signs off first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalOrder {
    /// First-listed department approves first.
    #[default]
    Forward,
    /// Last-listed department approves first.
    Reversed,
}

/// Approvers resolved for one submission.
#[derive(Debug, Clone)]
pub struct ApprovalChain {
    pub approvers: Vec<Approver>,
    /// Name of the submitter's first-listed department.
    pub home_department: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalChainBuilder {
    order: ApprovalOrder,
}

impl ApprovalChainBuilder {
    pub fn new(order: ApprovalOrder) -> Self {
        Self { order }
    }

    /// Resolves every department of `user_id` to its approver. Any gap fails
    /// the whole build; a partial chain is never returned.
    pub async fn build(
        &self,
        directory: &dyn Directory,
        user_id: UserId,
    ) -> Result<ApprovalChain, WorkflowError> {
        let department_ids = directory.departments_of(user_id).await?;
        if department_ids.is_empty() {
            return Err(WorkflowError::Validation(
                "submitter belongs to no department, no approval chain can be built".to_string(),
            ));
        }

        let mut approvers = Vec::with_capacity(department_ids.len());
        let mut home_department = None;
        for department_id in department_ids {
            let department = directory.department(department_id).await?.ok_or_else(|| {
                WorkflowError::Dependency(format!("department {} not found in directory", department_id))
            })?;
            let approver = directory.approver_of(department_id).await?.ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "department {} has no designated approver",
                    department.name
                ))
            })?;
            if home_department.is_none() {
                home_department = Some(department.name);
            }
            approvers.push(approver);
        }

        if self.order == ApprovalOrder::Reversed {
            approvers.reverse();
        }
        debug!(user_id, chain_len = approvers.len(), "Approval chain resolved");

        Ok(ApprovalChain {
            approvers,
            home_department,
        })
    }
}
