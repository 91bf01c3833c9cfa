use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{StoreError, Tx, UserStore};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::query::{OrderBy, Page};
use crate::services::auth::Claims;
use crate::services::map_not_found;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub struct UserService {
    store: Arc<dyn UserStore>,
    hash_cost: u32,
}

fn check_name(name: &str, errors: &mut FieldErrors) {
    if name.trim().is_empty() {
        errors.insert("name", "must not be empty".to_string());
    }
}

fn check_email(email: &str, errors: &mut FieldErrors) {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        errors.insert("email", "must be a valid email address".to_string());
    }
}

fn check_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.insert(
            "password",
            format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
}

fn finish(errors: FieldErrors) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn unique_violation(e: StoreError, id: Uuid) -> AppError {
    match e {
        StoreError::Conflict => AppError::UniqueEmailOrPhone,
        StoreError::NotFound => {
            tracing::debug!("User {} vanished during write", id);
            AppError::UserNotFound
        }
        other => other.into(),
    }
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        UserService {
            store,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Lower bcrypt costs keep tests fast.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn with_transaction(&self, tx: &Tx) -> UserService {
        UserService {
            store: self.store.with_transaction(tx),
            hash_cost: self.hash_cost,
        }
    }

    async fn hash_password(&self, password: String) -> AppResult<String> {
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing task failed: {e}")))?
            .map_err(AppError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> AppResult<bool> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password check task failed: {e}")))?
            .map_err(AppError::from)
    }

    /// Registers a user with the `USER` role.
    pub async fn create(&self, new: NewUser, now: DateTime<Utc>) -> AppResult<User> {
        let mut errors = FieldErrors::new();
        check_name(&new.name, &mut errors);
        check_email(&new.email, &mut errors);
        check_password(&new.password, &mut errors);
        finish(errors)?;

        let user = User {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            email: normalize_email(&new.email),
            roles: vec![Role::User],
            password_hash: self.hash_password(new.password).await?,
            enabled: true,
            phone_no: new.phone_no,
            date_created: now,
            date_updated: now,
        };

        self.store
            .create(&user)
            .await
            .map_err(|e| unique_violation(e, user.id))?;

        tracing::info!("Created user {}", user.id);
        Ok(user)
    }

    /// Roles can only be changed by admins.
    pub async fn update(
        &self,
        claims: &Claims,
        existing: User,
        patch: UpdateUser,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        if patch.roles.is_some() && !claims.is_admin() {
            tracing::debug!("Subject {} may not change roles", claims.sub);
            return Err(AppError::PermissionDenied);
        }

        let mut errors = FieldErrors::new();
        if let Some(name) = &patch.name {
            check_name(name, &mut errors);
        }
        if let Some(email) = &patch.email {
            check_email(email, &mut errors);
        }
        if let Some(password) = &patch.password {
            check_password(password, &mut errors);
        }
        if matches!(&patch.roles, Some(roles) if roles.is_empty()) {
            errors.insert("roles", "must not be empty".to_string());
        }
        finish(errors)?;

        let password_hash = match patch.password {
            Some(password) => self.hash_password(password).await?,
            None => existing.password_hash.clone(),
        };

        let user = User {
            name: patch
                .name
                .map(|name| name.trim().to_string())
                .unwrap_or(existing.name),
            email: patch
                .email
                .map(|email| normalize_email(&email))
                .unwrap_or(existing.email),
            roles: patch.roles.unwrap_or(existing.roles),
            password_hash,
            enabled: patch.enabled.unwrap_or(existing.enabled),
            phone_no: patch.phone_no.unwrap_or(existing.phone_no),
            date_updated: now,
            ..existing
        };

        self.store
            .update(&user)
            .await
            .map_err(|e| unique_violation(e, user.id))?;
        Ok(user)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.store
            .delete(id)
            .await
            .map_err(|e| map_not_found(e, AppError::UserNotFound))?;
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    pub async fn query(&self, filter: &UserFilter, order: OrderBy, page: Page) -> AppResult<Vec<User>> {
        Ok(self.store.query(filter, order, page).await?)
    }

    pub async fn count(&self, filter: &UserFilter) -> AppResult<i64> {
        Ok(self.store.count(filter).await?)
    }

    pub async fn query_by_id(&self, id: Uuid) -> AppResult<User> {
        self.store
            .query_by_id(id)
            .await
            .map_err(|e| map_not_found(e, AppError::UserNotFound))
    }

    /// Checks basic-auth credentials. Unknown emails and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let user = match self.store.query_by_email(&normalize_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::debug!("Authentication failed: unknown email");
                return Err(AppError::Unauthenticated);
            }
            Err(e) => return Err(e.into()),
        };

        if !self
            .verify_password(password.to_string(), user.password_hash.clone())
            .await?
        {
            tracing::debug!("Authentication failed for user {}: wrong password", user.id);
            return Err(AppError::Unauthenticated);
        }
        if !user.enabled {
            return Err(AppError::UserDisabled);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::UserRepository;
    use crate::db::testing::memory_pool;

    fn new_user(email: &str, phone: &str) -> NewUser {
        NewUser {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            phone_no: PhoneNumber::parse(phone).unwrap(),
        }
    }

    fn claims(sub: Uuid, roles: Vec<Role>) -> Claims {
        Claims {
            sub,
            roles,
            iss: "test".to_string(),
            iat: 0,
            exp: 0,
        }
    }

    async fn service() -> UserService {
        let pool = memory_pool().await;
        UserService::new(Arc::new(UserRepository::new(pool))).with_hash_cost(4)
    }

    #[tokio::test]
    async fn registration_hashes_and_defaults_roles() {
        let users = service().await;
        let user = users
            .create(new_user(" Ada@Example.com ", "+14155550100"), Utc::now())
            .await
            .unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.roles, vec![Role::User]);
        assert_ne!(user.password_hash, "correct horse");
        assert_eq!(users.query_by_id(user.id).await.unwrap(), user);

        let authenticated =
            tokio_test::assert_ok!(users.authenticate("ADA@example.com", "correct horse").await);
        assert_eq!(authenticated.id, user.id);
        assert!(matches!(
            users.authenticate("ada@example.com", "wrong horse").await,
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            users.authenticate("nobody@example.com", "correct horse").await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn duplicates_and_invalid_fields_are_rejected() {
        let users = service().await;
        users
            .create(new_user("ada@example.com", "+14155550100"), Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            users
                .create(new_user("ada@example.com", "+14155550199"), Utc::now())
                .await,
            Err(AppError::UniqueEmailOrPhone)
        ));
        assert!(matches!(
            users
                .create(new_user("grace@example.com", "+14155550100"), Utc::now())
                .await,
            Err(AppError::UniqueEmailOrPhone)
        ));

        let mut invalid = new_user("not-an-email", "+14155550101");
        invalid.password = "short".to_string();
        match users.create(invalid, Utc::now()).await {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("password"));
                assert!(!fields.contains_key("name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_admins_change_roles() {
        let users = service().await;
        let user = users
            .create(new_user("ada@example.com", "+14155550100"), Utc::now())
            .await
            .unwrap();

        let promote = UpdateUser {
            roles: Some(vec![Role::Admin, Role::User]),
            ..Default::default()
        };
        assert!(matches!(
            users
                .update(&claims(user.id, vec![Role::User]), user.clone(), promote.clone(), Utc::now())
                .await,
            Err(AppError::PermissionDenied)
        ));

        let promoted = users
            .update(&claims(Uuid::new_v4(), vec![Role::Admin]), user.clone(), promote, Utc::now())
            .await
            .unwrap();
        assert!(promoted.is_admin());

        let disable = UpdateUser {
            enabled: Some(false),
            ..Default::default()
        };
        let disabled = users
            .update(&claims(user.id, vec![Role::User]), promoted, disable, Utc::now())
            .await
            .unwrap();
        assert!(!disabled.enabled);
        assert!(matches!(
            users.authenticate("ada@example.com", "correct horse").await,
            Err(AppError::UserDisabled)
        ));

        users.delete(user.id).await.unwrap();
        assert!(matches!(
            users.delete(user.id).await,
            Err(AppError::UserNotFound)
        ));
    }
}
