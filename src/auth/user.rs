use serde::Serialize;

use super::{Permission, Role};
use crate::error::AppError;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub company: String,
    pub job_title: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub role: Option<String>,
    pub department_id: Option<i64>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
            surname: user.surname.unwrap_or_default(),
            phone: user.phone.unwrap_or_default(),
            company: user.company.unwrap_or_default(),
            job_title: user.job_title.unwrap_or_default(),
            role: Role::from_str(&user.role.unwrap_or_default()).unwrap_or(Role::Employee),
            department_id: user.department_id,
        }
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::AccessDenied(format!(
                "Role {} may not perform this action",
                self.role.as_str()
            )))
        }
    }

    /// Managers and HR may look at results from an employee's department;
    /// everyone may look at their own.
    pub fn require_result_access(&self, owner_id: i64, owner_department: Option<i64>) -> Result<(), AppError> {
        if self.id == owner_id || self.has_permission(Permission::ViewAllResults) {
            return Ok(());
        }
        if self.has_permission(Permission::ViewDepartmentResults)
            && self.department_id.is_some()
            && self.department_id == owner_department
        {
            return Ok(());
        }
        Err(AppError::AccessDenied(
            "Test attempt belongs to another user".to_string(),
        ))
    }
}
