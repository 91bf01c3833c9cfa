use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::models::{Role, User};
use crate::error::{AppError, AppResult};

/// Upper bound for resolving a signing or verification key.
const KEY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub roles: Vec<Role>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

// ============================================================================
// Key store
// ============================================================================

/// PEM keys on disk, addressed by key id: `<folder>/<kid>.pem` holds the
/// private key and `<folder>/<kid>.pub.pem` the public key. Public keys are
/// cached after the first read.
pub struct KeyStore {
    folder: PathBuf,
    public_keys: RwLock<HashMap<String, String>>,
}

impl KeyStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        KeyStore {
            folder: folder.into(),
            public_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Key ids become file names, so only a conservative alphabet is allowed.
    fn check_kid(kid: &str) -> AppResult<()> {
        let valid = !kid.is_empty()
            && kid.len() <= 64
            && kid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(AppError::InvalidArgument(format!("invalid key id {kid:?}")))
        }
    }

    async fn read_pem(&self, file_name: String) -> AppResult<String> {
        let path = self.folder.join(file_name);
        match tokio::time::timeout(KEY_LOOKUP_TIMEOUT, tokio::fs::read_to_string(&path)).await {
            Ok(Ok(pem)) => Ok(pem),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Key file {} not found", path.display());
                Err(AppError::NotFound("signing key".to_string()))
            }
            Ok(Err(e)) => Err(AppError::Internal(anyhow::anyhow!(
                "reading key file {}: {e}",
                path.display()
            ))),
            Err(_) => Err(AppError::Internal(anyhow::anyhow!(
                "timed out reading key file {}",
                path.display()
            ))),
        }
    }

    pub async fn private_key(&self, kid: &str) -> AppResult<EncodingKey> {
        Self::check_kid(kid)?;
        let pem = self.read_pem(format!("{kid}.pem")).await?;
        Ok(EncodingKey::from_rsa_pem(pem.as_bytes())?)
    }

    pub async fn public_key(&self, kid: &str) -> AppResult<DecodingKey> {
        Self::check_kid(kid)?;

        if let Some(pem) = self.public_keys.read().await.get(kid) {
            return Ok(DecodingKey::from_rsa_pem(pem.as_bytes())?);
        }

        let pem = self.read_pem(format!("{kid}.pub.pem")).await?;
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())?;
        self.public_keys.write().await.insert(kid.to_string(), pem);
        Ok(key)
    }
}

// ============================================================================
// Auth service
// ============================================================================

pub struct AuthService {
    keys: KeyStore,
    issuer: String,
    active_kid: String,
    token_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        AuthService {
            keys: KeyStore::new(config.keys_folder.clone()),
            issuer: config.issuer.clone(),
            active_kid: config.active_kid.clone(),
            token_ttl: chrono::Duration::from_std(config.token_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(8)),
        }
    }

    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    /// Startup check: the active key pair must be readable and parseable.
    pub async fn ensure_active_key(&self) -> anyhow::Result<()> {
        self.keys
            .private_key(&self.active_kid)
            .await
            .map_err(|e| anyhow::anyhow!("active signing key {:?}: {e}", self.active_kid))?;
        self.keys
            .public_key(&self.active_kid)
            .await
            .map_err(|e| anyhow::anyhow!("active public key {:?}: {e}", self.active_kid))?;
        Ok(())
    }

    /// Signs an RS256 token for `user` with the key `kid`.
    pub async fn issue_token(&self, kid: &str, user: &User, now: DateTime<Utc>) -> AppResult<String> {
        let key = match self.keys.private_key(kid).await {
            Err(AppError::NotFound(_)) => {
                return Err(AppError::NotFound(format!("key {kid:?}")));
            }
            other => other?,
        };

        let claims = Claims {
            sub: user.id,
            roles: user.roles.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());

        Ok(encode(&header, &claims, &key)?)
    }

    /// Verifies signature, issuer and expiry and returns the claims.
    pub async fn authenticate(&self, token: &str) -> AppResult<Claims> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(AppError::Unauthenticated)?;

        let key = match self.keys.public_key(&kid).await {
            Ok(key) => key,
            Err(AppError::NotFound(_)) | Err(AppError::InvalidArgument(_)) => {
                tracing::debug!("Rejecting token signed with unknown kid {:?}", kid);
                return Err(AppError::Unauthenticated);
            }
            Err(e) => return Err(e),
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub const TEST_KID: &str = "test";

    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            keys_folder: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/keys")),
            active_kid: TEST_KID.to_string(),
            issuer: "booking service".to_string(),
            token_ttl: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::models::PhoneNumber;

    fn user(roles: Vec<Role>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles,
            password_hash: String::new(),
            enabled: true,
            phone_no: PhoneNumber::parse("+14155550100").unwrap(),
            date_created: now,
            date_updated: now,
        }
    }

    #[tokio::test]
    async fn issued_tokens_authenticate() {
        let auth = AuthService::new(&test_auth_config());
        auth.ensure_active_key().await.unwrap();

        let admin = user(vec![Role::Admin, Role::User]);
        let token = auth.issue_token(TEST_KID, &admin, Utc::now()).await.unwrap();
        let claims = auth.authenticate(&token).await.unwrap();

        assert_eq!(claims.sub, admin.id);
        assert!(claims.is_admin());
        assert_eq!(claims.iss, "booking service");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn expired_and_foreign_tokens_are_rejected() {
        let auth = AuthService::new(&test_auth_config());
        let someone = user(vec![Role::User]);

        let issued_long_ago = Utc::now() - chrono::Duration::hours(3);
        let expired = auth
            .issue_token(TEST_KID, &someone, issued_long_ago)
            .await
            .unwrap();
        assert!(matches!(
            auth.authenticate(&expired).await,
            Err(AppError::Jwt(_))
        ));

        let mut other_issuer = test_auth_config();
        other_issuer.issuer = "someone else".to_string();
        let foreign = AuthService::new(&other_issuer)
            .issue_token(TEST_KID, &someone, Utc::now())
            .await
            .unwrap();
        assert!(auth.authenticate(&foreign).await.is_err());

        assert!(auth.authenticate("not-a-token").await.is_err());
    }

    #[tokio::test]
    async fn unknown_or_unsafe_kids_are_refused() {
        let auth = AuthService::new(&test_auth_config());
        let someone = user(vec![Role::User]);

        assert!(matches!(
            auth.issue_token("missing", &someone, Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            auth.issue_token("../test", &someone, Utc::now()).await,
            Err(AppError::InvalidArgument(_))
        ));
    }
}
