//! Shortcut aliases (C8, §4.8): a path rewrite resolved from the caller's own
//! authorization selectors, rather than from path segments supplied by the request.

use crate::auth::AuthContext;
use crate::error::KurbisioError;
use crate::model::config_doc::Shortcut;

/// Only `admin`, a role the shortcut explicitly lists, or the open role
/// (`everybody`/`public`) may resolve a shortcut (§4.8).
fn shortcut_role_matches(shortcut: &Shortcut, ctx: &AuthContext) -> bool {
    if ctx.is_admin() {
        return true;
    }
    if shortcut.roles.iter().any(|r| r == "everybody" || r == "public") {
        return true;
    }
    shortcut.roles.iter().any(|r| ctx.has_role(r))
}

/// Resolve `shortcut.target`'s `{seg}` placeholders from `ctx`'s selectors, e.g.
/// `users/{user_id}/profile` with `selectors = {"user_id": "11111111-..."}`
/// resolves to `users/11111111-.../profile`.
pub fn resolve(shortcut: &Shortcut, ctx: &AuthContext) -> Result<String, KurbisioError> {
    if !shortcut_role_matches(shortcut, ctx) {
        return Err(KurbisioError::Authz(format!(
            "no role grants access to shortcut '{}'",
            shortcut.shortcut
        )));
    }

    let mut resolved = String::with_capacity(shortcut.target.len());
    let mut rest = shortcut.target.as_str();
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}').map(|e| e + start) else {
            return Err(KurbisioError::Config(format!(
                "shortcut '{}' has an unterminated placeholder",
                shortcut.shortcut
            )));
        };
        resolved.push_str(&rest[..start]);
        let key = &rest[start + 1..end];
        let value = ctx.selector(key).ok_or_else(|| {
            KurbisioError::Authz(format!(
                "caller has no selector '{key}' required by shortcut '{}'",
                shortcut.shortcut
            ))
        })?;
        resolved.push_str(value);
        rest = &rest[end + 1..];
    }
    resolved.push_str(rest);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn shortcut(roles: &[&str]) -> Shortcut {
        Shortcut {
            shortcut: "me".to_string(),
            target: "users/{user_id}/profile".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn resolves_placeholder_from_caller_selector() {
        let s = shortcut(&["user"]);
        let mut selectors = HashMap::new();
        selectors.insert("user_id".to_string(), "abc-123".to_string());
        let ctx = AuthContext::new(vec!["user".to_string()], selectors);
        assert_eq!(resolve(&s, &ctx).unwrap(), "users/abc-123/profile");
    }

    #[test]
    fn missing_selector_is_denied() {
        let s = shortcut(&["user"]);
        let ctx = AuthContext::new(vec!["user".to_string()], HashMap::new());
        assert!(resolve(&s, &ctx).is_err());
    }

    #[test]
    fn role_not_listed_is_denied() {
        let s = shortcut(&["owner"]);
        let ctx = AuthContext::new(vec!["guest".to_string()], HashMap::new());
        assert!(matches!(resolve(&s, &ctx), Err(KurbisioError::Authz(_))));
    }

    #[test]
    fn admin_bypasses_role_list() {
        let s = shortcut(&["owner"]);
        let mut selectors = HashMap::new();
        selectors.insert("user_id".to_string(), "zzz".to_string());
        let ctx = AuthContext::new(vec!["admin".to_string()], selectors);
        assert_eq!(resolve(&s, &ctx).unwrap(), "users/zzz/profile");
    }

    #[test]
    fn everybody_role_matches_any_caller() {
        let s = shortcut(&["everybody"]);
        let mut selectors = HashMap::new();
        selectors.insert("user_id".to_string(), "anon".to_string());
        let ctx = AuthContext::new(vec![], selectors);
        assert_eq!(resolve(&s, &ctx).unwrap(), "users/anon/profile");
    }
}
