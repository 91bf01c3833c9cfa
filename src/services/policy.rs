use uuid::Uuid;

use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::services::auth::Claims;

/// Access rules evaluated against verified claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    AdminOnly,
    UserOnly,
    /// Admins, or the subject that owns the resource.
    AdminOrSubject,
}

pub fn authorize(claims: &Claims, owner: Option<Uuid>, rule: Rule) -> AppResult<()> {
    let allowed = match rule {
        Rule::AdminOnly => claims.is_admin(),
        Rule::UserOnly => claims.has_role(Role::User),
        Rule::AdminOrSubject => claims.is_admin() || owner == Some(claims.sub),
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            "Denied {:?} for subject {} on resource owned by {:?}",
            rule,
            claims.sub,
            owner
        );
        Err(AppError::PermissionDenied)
    }
}
