use serde::{Deserialize, Serialize};

use crate::model::leave_request::Approver;

pub type DepartmentId = u64;

/// A department as seen by the approval flow: its name and the user who
/// signs off leave for its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    #[serde(default)]
    pub approver: Option<Approver>,
}
