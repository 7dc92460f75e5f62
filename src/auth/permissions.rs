use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    TakeTests,
    SubmitSelfAssessment,
    ViewOwnResults,

    RateEmployees,
    ViewDepartmentResults,

    ViewAllResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Employee,
    Manager,
    Hr,
}

static EMPLOYEE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::TakeTests);
    permissions.insert(Permission::SubmitSelfAssessment);
    permissions.insert(Permission::ViewOwnResults);

    permissions
});

static MANAGER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EMPLOYEE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::RateEmployees);
    permissions.insert(Permission::ViewDepartmentResults);

    permissions
});

static HR_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EMPLOYEE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewDepartmentResults);
    permissions.insert(Permission::ViewAllResults);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Employee => &EMPLOYEE_PERMISSIONS,
            Role::Manager => &MANAGER_PERMISSIONS,
            Role::Hr => &HR_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Hr => "hr",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "hr" => Ok(Role::Hr),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Employee => write!(f, "employee"),
            Role::Manager => write!(f, "manager"),
            Role::Hr => write!(f, "hr"),
        }
    }
}
