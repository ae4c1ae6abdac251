pub const ROLES: &[&str] = &["admin", "hr", "manager", "employee"];

/// Default permission set granted with a role.
pub fn for_role(role: &str) -> Vec<String> {
    let perms: &[&str] = match role {
        "admin" => &[
            "company.manage",
            "users.manage",
            "employees.read",
            "employees.write",
            "payroll.manage",
            "leave.approve",
            "reports.view",
        ],
        "hr" => &[
            "users.manage",
            "employees.read",
            "employees.write",
            "leave.approve",
            "reports.view",
        ],
        "manager" => &["employees.read", "leave.approve", "reports.view"],
        _ => &["profile.read", "profile.write", "leave.request"],
    };
    perms.iter().map(|p| p.to_string()).collect()
}

pub fn is_valid_role(role: &str) -> bool {
    ROLES.contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_manage_users() {
        assert!(for_role("admin").iter().any(|p| p == "users.manage"));
        assert!(for_role("hr").iter().any(|p| p == "users.manage"));
        assert!(!for_role("employee").iter().any(|p| p == "users.manage"));
    }

    #[test]
    fn unknown_roles_are_invalid() {
        assert!(is_valid_role("manager"));
        assert!(!is_valid_role("root"));
    }
}
