//! The access/authorization module (C-ext, §1): treated as a capability oracle.
//! Only its contract is modeled here — resolving an inbound request into roles and
//! selectors, and checking those against a resource's configured permits.
//!
//! Grounded on the teacher's `common/auth/builder.rs` (`Actor::new(id).can(cap).check(deps)`
//! fluent entry point, a `HasAuthContext` trait for the dependency seam) generalized
//! from its fixed `AdminCapability` enum to the declarative `Permit { role, operations,
//! selectors }` model (§3.1).

use crate::error::KurbisioError;
use crate::model::config_doc::{Operation, Permit};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;

/// The resolved identity of a caller: the roles it was granted, and the selector
/// values (e.g. `user_id`) bound to it. Selectors fill in a shortcut's missing path
/// segments (§4.8) and restrict which rows a non-admin caller may see.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub roles: Vec<String>,
    pub selectors: HashMap<String, String>,
}

impl AuthContext {
    pub fn new(roles: Vec<String>, selectors: HashMap<String, String>) -> Self {
        Self { roles, selectors }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    pub fn selector(&self, key: &str) -> Option<&str> {
        self.selectors.get(key).map(String::as_str)
    }
}

/// The capability oracle's contract: turn request headers (bearer token, session
/// cookie, whatever the deployment uses) into an [`AuthContext`]. Its internals are
/// out of scope (§1); only this seam is modeled.
#[async_trait]
pub trait BaseAuthorizer: Send + Sync {
    async fn authorize_request(&self, headers: &HeaderMap) -> Result<AuthContext, KurbisioError>;
}

/// A minimal stand-in for a real capability oracle, suitable for local development
/// and as the default wired up by the binary entry point: it trusts
/// `X-Kurbisio-Roles` (comma-separated) and any `X-Kurbisio-Selector-<key>` headers
/// verbatim, the way a gateway or sidecar would inject an already-verified identity
/// ahead of this service in a real deployment (§1: the real oracle is out of scope).
pub struct HeaderAuthorizer;

const ROLES_HEADER: &str = "x-kurbisio-roles";
const SELECTOR_HEADER_PREFIX: &str = "x-kurbisio-selector-";

#[async_trait]
impl BaseAuthorizer for HeaderAuthorizer {
    async fn authorize_request(&self, headers: &HeaderMap) -> Result<AuthContext, KurbisioError> {
        let roles = headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect())
            .unwrap_or_default();

        let mut selectors = HashMap::new();
        for (name, value) in headers.iter() {
            if let Some(key) = name.as_str().strip_prefix(SELECTOR_HEADER_PREFIX) {
                if let Ok(value) = value.to_str() {
                    selectors.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(AuthContext::new(roles, selectors))
    }
}


/// A role matches a permit if it is `admin` (always authorized, per §4.8's shortcut
/// rule generalized to every resource), the permit's own role, or the permit names
/// the universally-open role (`everybody`/`public`).
fn role_matches(permit_role: &str, ctx: &AuthContext) -> bool {
    if ctx.is_admin() {
        return true;
    }
    if permit_role == "everybody" || permit_role == "public" {
        return true;
    }
    ctx.has_role(permit_role)
}

/// `Actor::new(ctx).can(op, permits).check()` (§4.8, §4.11): find a permit granting
/// the caller's roles authority over `operation`, returning it so the caller can read
/// its `selectors` to restrict the query.
pub struct Actor<'a> {
    ctx: &'a AuthContext,
}

impl<'a> Actor<'a> {
    pub fn new(ctx: &'a AuthContext) -> Self {
        Self { ctx }
    }

    pub fn can(self, operation: Operation, permits: &'a [Permit]) -> PermitCheck<'a> {
        PermitCheck {
            ctx: self.ctx,
            operation,
            permits,
        }
    }
}

pub struct PermitCheck<'a> {
    ctx: &'a AuthContext,
    operation: Operation,
    permits: &'a [Permit],
}

impl<'a> PermitCheck<'a> {
    /// Returns the first matching permit, or a 401-mapped [`KurbisioError::Authz`] if
    /// none of the configured permits grant this operation to this caller.
    pub fn check(self) -> Result<&'a Permit, KurbisioError> {
        self.permits
            .iter()
            .find(|permit| {
                permit.operations.contains(&self.operation) && role_matches(&permit.role, self.ctx)
            })
            .ok_or_else(|| {
                KurbisioError::Authz(format!(
                    "no permit grants {:?} to roles {:?}",
                    self.operation, self.ctx.roles
                ))
            })
    }

    /// Like [`Self::check`], but also enforces the matched permit's `selectors`
    /// (§3.1) against the id columns this request actually addresses.
    pub fn check_scoped(self, id_columns: &[(&str, String)]) -> Result<&'a Permit, KurbisioError> {
        let ctx = self.ctx;
        let permit = self.check()?;
        enforce_selectors(permit, ctx, id_columns)?;
        Ok(permit)
    }
}

/// A permit's `selectors` name which of the caller's bound selector values (§4.8,
/// e.g. a `user_id` lifted from a bearer token) must agree with the resource actually
/// being addressed. Admins bypass this; everyone else must both carry the named
/// selector and, where it lines up with one of the request's own id columns, address
/// only the row their selector value names. A selector with no corresponding id
/// column here (e.g. a shortcut's injected path segment) only needs to be present.
pub fn enforce_selectors(
    permit: &Permit,
    ctx: &AuthContext,
    id_columns: &[(&str, String)],
) -> Result<(), KurbisioError> {
    if ctx.is_admin() || permit.selectors.is_empty() {
        return Ok(());
    }
    for name in &permit.selectors {
        let expected = ctx.selector(name).ok_or_else(|| {
            KurbisioError::Authz(format!("missing selector '{name}' for restricted permit"))
        })?;
        if let Some((_, actual)) = id_columns.iter().find(|(col, _)| col == name) {
            if actual != expected {
                return Err(KurbisioError::Authz(format!(
                    "selector '{name}' does not authorize this resource"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn permit(role: &str, ops: &[Operation]) -> Permit {
        Permit {
            role: role.to_string(),
            operations: ops.to_vec(),
            selectors: vec![],
        }
    }

    #[test]
    fn matching_role_and_operation_grants_access() {
        let ctx = AuthContext::new(vec!["user".into()], HashMap::new());
        let permits = vec![permit("user", &[Operation::Read, Operation::List])];
        let granted = Actor::new(&ctx).can(Operation::Read, &permits).check();
        assert!(granted.is_ok());
    }

    #[test]
    fn unmatched_role_is_denied() {
        let ctx = AuthContext::new(vec!["guest".into()], HashMap::new());
        let permits = vec![permit("user", &[Operation::Read])];
        let err = Actor::new(&ctx).can(Operation::Read, &permits).check().unwrap_err();
        assert!(matches!(err, KurbisioError::Authz(_)));
    }

    #[test]
    fn admin_bypasses_role_matching() {
        let ctx = AuthContext::new(vec!["admin".into()], HashMap::new());
        let permits = vec![permit("owner", &[Operation::Delete])];
        assert!(Actor::new(&ctx).can(Operation::Delete, &permits).check().is_ok());
    }

    #[test]
    fn everybody_permit_matches_any_caller() {
        let ctx = AuthContext::new(vec![], HashMap::new());
        let permits = vec![permit("everybody", &[Operation::List])];
        assert!(Actor::new(&ctx).can(Operation::List, &permits).check().is_ok());
    }

    #[test]
    fn operation_not_listed_in_matched_permit_is_denied() {
        let ctx = AuthContext::new(vec!["user".into()], HashMap::new());
        let permits = vec![permit("user", &[Operation::Read])];
        let err = Actor::new(&ctx).can(Operation::Delete, &permits).check().unwrap_err();
        assert!(matches!(err, KurbisioError::Authz(_)));
    }

    fn scoped_permit(role: &str, ops: &[Operation], selectors: &[&str]) -> Permit {
        Permit {
            role: role.to_string(),
            operations: ops.to_vec(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn selector_restricted_permit_denies_a_caller_missing_the_selector() {
        let ctx = AuthContext::new(vec!["user".into()], HashMap::new());
        let permits = vec![scoped_permit("user", &[Operation::Read], &["user_id"])];
        let err = Actor::new(&ctx)
            .can(Operation::Read, &permits)
            .check_scoped(&[("user_id", Uuid::nil().to_string())])
            .unwrap_err();
        assert!(matches!(err, KurbisioError::Authz(_)));
    }

    #[test]
    fn selector_restricted_permit_denies_a_mismatched_row() {
        let own_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let mut selectors = HashMap::new();
        selectors.insert("user_id".to_string(), own_id.to_string());
        let ctx = AuthContext::new(vec!["user".into()], selectors);
        let permits = vec![scoped_permit("user", &[Operation::Read], &["user_id"])];
        let err = Actor::new(&ctx)
            .can(Operation::Read, &permits)
            .check_scoped(&[("user_id", other_id.to_string())])
            .unwrap_err();
        assert!(matches!(err, KurbisioError::Authz(_)));
    }

    #[test]
    fn selector_restricted_permit_allows_the_matching_row() {
        let own_id = Uuid::new_v4();
        let mut selectors = HashMap::new();
        selectors.insert("user_id".to_string(), own_id.to_string());
        let ctx = AuthContext::new(vec!["user".into()], selectors);
        let permits = vec![scoped_permit("user", &[Operation::Read], &["user_id"])];
        assert!(Actor::new(&ctx)
            .can(Operation::Read, &permits)
            .check_scoped(&[("user_id", own_id.to_string())])
            .is_ok());
    }

    #[test]
    fn admin_bypasses_selector_restrictions() {
        let ctx = AuthContext::new(vec!["admin".into()], HashMap::new());
        let permits = vec![scoped_permit("owner", &[Operation::Read], &["user_id"])];
        assert!(Actor::new(&ctx)
            .can(Operation::Read, &permits)
            .check_scoped(&[("user_id", Uuid::nil().to_string())])
            .is_ok());
    }

    #[test]
    fn empty_selectors_behave_exactly_like_check() {
        let ctx = AuthContext::new(vec!["user".into()], HashMap::new());
        let permits = vec![permit("user", &[Operation::Read])];
        assert!(Actor::new(&ctx)
            .can(Operation::Read, &permits)
            .check_scoped(&[("user_id", Uuid::nil().to_string())])
            .is_ok());
    }
}
