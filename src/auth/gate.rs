//! Role-gated routing.

use super::tokens::SessionView;
use crate::user::Role;

/// Authorization outcome for one request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

/// Why a request was denied. Callers render these differently: redirect to
/// sign-in vs. the access-denied page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
}

/// Classifies request paths by prefix and decides access from the session's
/// public view. First match wins; unmatched paths are public.
///
/// Token signature verification happens in the token issuer before a view
/// ever reaches this gate.
#[derive(Debug, Clone)]
pub struct RouteGate {
    admin_prefixes: Vec<String>,
    employee_prefixes: Vec<String>,
}

impl Default for RouteGate {
    fn default() -> Self {
        Self {
            admin_prefixes: vec!["/admin".to_string(), "/api/admin".to_string()],
            employee_prefixes: vec![
                "/dashboard".to_string(),
                "/employees".to_string(),
                "/departments".to_string(),
                "/payroll".to_string(),
                "/leave".to_string(),
                "/recruitment".to_string(),
                "/performance".to_string(),
                "/benefits".to_string(),
            ],
        }
    }
}

impl RouteGate {
    pub fn new(admin_prefixes: Vec<String>, employee_prefixes: Vec<String>) -> Self {
        Self {
            admin_prefixes,
            employee_prefixes,
        }
    }

    /// Decide access for a path given the session's public view, if any.
    pub fn authorize(&self, path: &str, session: Option<&SessionView>) -> Access {
        if matches_any(&self.admin_prefixes, path) {
            return match session {
                Some(view) if view.role == Role::Admin => Access::Allow,
                Some(_) => Access::Deny(DenyReason::Forbidden),
                None => Access::Deny(DenyReason::Unauthenticated),
            };
        }

        if matches_any(&self.employee_prefixes, path) {
            return match session {
                Some(_) => Access::Allow,
                None => Access::Deny(DenyReason::Unauthenticated),
            };
        }

        Access::Allow
    }
}

/// Prefix match on path segments: "/admin" covers "/admin" and "/admin/x"
/// but not "/administrivia".
fn matches_any(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|prefix| {
        path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(role: Role) -> SessionView {
        SessionView {
            id: "u1".to_string(),
            role,
        }
    }

    #[test]
    fn test_admin_path_requires_admin_role() {
        let gate = RouteGate::default();

        assert_eq!(
            gate.authorize("/admin", Some(&view(Role::Employee))),
            Access::Deny(DenyReason::Forbidden)
        );
        assert_eq!(gate.authorize("/admin", Some(&view(Role::Admin))), Access::Allow);
        assert_eq!(
            gate.authorize("/admin", None),
            Access::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn test_employee_path_requires_session() {
        let gate = RouteGate::default();

        assert_eq!(
            gate.authorize("/dashboard", None),
            Access::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(
            gate.authorize("/dashboard", Some(&view(Role::Employee))),
            Access::Allow
        );
        assert_eq!(
            gate.authorize("/payroll/runs/2024-06", Some(&view(Role::Admin))),
            Access::Allow
        );
    }

    #[test]
    fn test_unmatched_paths_are_public() {
        let gate = RouteGate::default();

        assert_eq!(gate.authorize("/", None), Access::Allow);
        assert_eq!(gate.authorize("/sign-in", None), Access::Allow);
        assert_eq!(gate.authorize("/health", None), Access::Allow);
    }

    #[test]
    fn test_prefix_matches_whole_segments_only() {
        let gate = RouteGate::default();

        assert_eq!(gate.authorize("/administrivia", None), Access::Allow);
        assert_eq!(
            gate.authorize("/admin/users/u1", None),
            Access::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn test_nested_admin_api_prefix() {
        let gate = RouteGate::default();

        assert_eq!(
            gate.authorize("/api/admin/users", Some(&view(Role::Employee))),
            Access::Deny(DenyReason::Forbidden)
        );
        assert_eq!(
            gate.authorize("/api/admin/users", Some(&view(Role::Admin))),
            Access::Allow
        );
    }
}
