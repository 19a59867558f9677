use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;

use crate::directory::{Directory, DirectoryError};
use crate::model::department::{Department, DepartmentId};
use crate::model::leave_request::UserId;

/// Shape of the `DIRECTORY_SEED` file.
#[derive(Debug, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub members: Vec<Membership>,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub departments: Vec<DepartmentId>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    departments: RwLock<HashMap<DepartmentId, Department>>,
    members: RwLock<HashMap<UserId, Vec<DepartmentId>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let seed: DirectorySeed =
            serde_json::from_str(raw).map_err(|e| DirectoryError::Seed(e.to_string()))?;
        let directory = Self::new();
        for department in seed.departments {
            directory.put_department(department)?;
        }
        for member in seed.members {
            directory.set_memberships(member.user_id, member.departments)?;
        }
        Ok(directory)
    }

    pub fn put_department(&self, department: Department) -> Result<(), DirectoryError> {
        self.departments
            .write()
            .map_err(|_| DirectoryError::Poisoned)?
            .insert(department.id, department);
        Ok(())
    }

    pub fn set_memberships(
        &self,
        user_id: UserId,
        departments: Vec<DepartmentId>,
    ) -> Result<(), DirectoryError> {
        self.members
            .write()
            .map_err(|_| DirectoryError::Poisoned)?
            .insert(user_id, departments);
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn departments_of(&self, user_id: UserId) -> Result<Vec<DepartmentId>, DirectoryError> {
        let members = self.members.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(members.get(&user_id).cloned().unwrap_or_default())
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, DirectoryError> {
        let departments = self.departments.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(departments.get(&id).cloned())
    }
}
