//! Scope checks

use crate::authenticator::AuthenticatedKey;
use tenantguard_common::{GateError, GateResult};

/// Wildcard scope satisfying every requirement
pub const ADMIN_SCOPE: &str = "admin";

/// Whether `granted` satisfies any of `required`. An empty requirement always passes.
pub fn has_any_scope<S: AsRef<str>>(granted: &[S], required: &[&str]) -> bool {
    if required.is_empty() {
        return true;
    }
    granted.iter().any(|scope| {
        let scope = scope.as_ref();
        scope == ADMIN_SCOPE || required.contains(&scope)
    })
}

/// Deny keys lacking every one of `required`
pub fn require_scope(key: &AuthenticatedKey, required: &[&str]) -> GateResult<()> {
    if has_any_scope(&key.scopes, required) {
        Ok(())
    } else {
        Err(GateError::InsufficientScope {
            required: required.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Deny test-mode keys on routes with real side effects
pub fn block_in_test_mode(key: &AuthenticatedKey) -> GateResult<()> {
    if key.is_test {
        Err(GateError::TestModeBlocked)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_scope_matches() {
        let granted = ["clients:read", "payments:write"];
        assert!(has_any_scope(&granted, &["payments:write", "payments:admin"]));
        assert!(!has_any_scope(&granted, &["keys:write"]));
        assert!(has_any_scope(&granted, &[]));
    }

    #[test]
    fn test_admin_is_wildcard() {
        assert!(has_any_scope(&["admin"], &["keys:write"]));
        let none: [&str; 0] = [];
        assert!(!has_any_scope(&none, &["keys:read"]));
    }
}
