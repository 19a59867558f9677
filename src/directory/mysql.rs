use async_trait::async_trait;
use sqlx::{FromRow, MySqlPool};

use crate::directory::{Directory, DirectoryError};
use crate::model::department::{Department, DepartmentId};
use crate::model::leave_request::{Approver, UserId};

#[derive(FromRow)]
struct DepartmentRow {
    id: u64,
    dept_name: String,
    approver_id: Option<u64>,
    approver_name: Option<String>,
    approver_email: Option<String>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        let approver = match (row.approver_id, row.approver_name) {
            (Some(user_id), Some(user_name)) => Some(Approver {
                user_id,
                user_name,
                email: row.approver_email,
            }),
            _ => None,
        };
        Department {
            id: row.id,
            name: row.dept_name,
            approver,
        }
    }
}

pub struct MySqlDirectory {
    pool: MySqlPool,
}

impl MySqlDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for MySqlDirectory {
    async fn departments_of(&self, user_id: UserId) -> Result<Vec<DepartmentId>, DirectoryError> {
        let ids = sqlx::query_scalar::<_, u64>(
            r#"
            SELECT department_id
            FROM user_departments
            WHERE user_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, DirectoryError> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            r#"
            SELECT
                d.id,
                d.dept_name,
                d.approver_id,
                u.username AS approver_name,
                u.email AS approver_email
            FROM departments d
            LEFT JOIN users u ON u.id = d.approver_id
            WHERE d.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Department::from))
    }
}
