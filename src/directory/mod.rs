//! Read-only lookups into the organisation chart: which departments a user
//! belongs to, and who approves leave for each department.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use derive_more::Display;

use crate::model::department::{Department, DepartmentId};
use crate::model::leave_request::{Approver, UserId};

pub use memory::MemoryDirectory;
pub use mysql::MySqlDirectory;

#[derive(Debug, Display)]
pub enum DirectoryError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "invalid directory seed: {}", _0)]
    Seed(String),
    #[display(fmt = "directory lock poisoned")]
    Poisoned,
}

impl std::error::Error for DirectoryError {}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        DirectoryError::Database(err)
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Department memberships in the order stored on the user record.
    async fn departments_of(&self, user_id: UserId) -> Result<Vec<DepartmentId>, DirectoryError>;

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, DirectoryError>;

    async fn approver_of(&self, id: DepartmentId) -> Result<Option<Approver>, DirectoryError> {
        Ok(self.department(id).await?.and_then(|d| d.approver))
    }
}
