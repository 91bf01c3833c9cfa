use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Phone numbers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phone number {0:?}: expected E.164 format such as +14155550123")]
pub struct PhoneNumberError(pub String);

/// Phone number in E.164 form: `+`, a non-zero country digit, 7 to 15 digits
/// in total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, PhoneNumberError> {
        let digits = raw
            .strip_prefix('+')
            .ok_or_else(|| PhoneNumberError(raw.to_string()))?;

        let valid = (7..=15).contains(&digits.len())
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !digits.starts_with('0');

        if valid {
            Ok(PhoneNumber(raw.to_string()))
        } else {
            Err(PhoneNumberError(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PhoneNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub enabled: bool,
    pub phone_no: PhoneNumber,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// `users` row. Roles are kept as a JSON array of role names.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: String,
    pub password_hash: String,
    pub enabled: bool,
    pub phone_no: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let roles: Vec<Role> = serde_json::from_str(&row.roles)
            .map_err(|e| StoreError::Internal(format!("user {} has corrupt roles: {e}", row.id)))?;
        let phone_no = PhoneNumber::parse(&row.phone_no)
            .map_err(|e| StoreError::Internal(format!("user {}: {e}", row.id)))?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            roles,
            password_hash: row.password_hash,
            enabled: row.enabled,
            phone_no,
            date_created: row.date_created,
            date_updated: row.date_updated,
        })
    }
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        let roles: Vec<&str> = user.roles.iter().map(|r| r.as_str()).collect();
        UserRow {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            roles: serde_json::to_string(&roles).unwrap_or_else(|_| "[]".to_string()),
            password_hash: user.password_hash.clone(),
            enabled: user.enabled,
            phone_no: user.phone_no.as_str().to_string(),
            date_created: user.date_created,
            date_updated: user.date_updated,
        }
    }
}

/// Data required to register a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_no: PhoneNumber,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_no: Option<PhoneNumber>,
    pub enabled: Option<bool>,
    pub roles: Option<Vec<Role>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub enabled: Option<bool>,
}

pub const USER_ORDER_FIELDS: &[&str] = &["id", "name", "email", "enabled", "date_created"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_follow_e164() {
        assert!(PhoneNumber::parse("+14155550123").is_ok());
        assert!(PhoneNumber::parse("+447911123456").is_ok());

        for bad in ["14155550123", "+0123456789", "+12", "+1415555012345678", "+1 415 555"] {
            assert!(PhoneNumber::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn phone_number_serde_is_a_plain_string() {
        let phone: PhoneNumber = serde_json::from_str("\"+14155550123\"").unwrap();
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"+14155550123\"");
        assert!(serde_json::from_str::<PhoneNumber>("\"555-0123\"").is_err());
    }

    #[test]
    fn roles_use_upper_case_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!("USER".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn user_row_round_trip() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec![Role::Admin, Role::User],
            password_hash: "hash".to_string(),
            enabled: true,
            phone_no: PhoneNumber::parse("+14155550123").unwrap(),
            date_created: now,
            date_updated: now,
        };
        let row = UserRow::from(&user);
        assert_eq!(row.roles, r#"["ADMIN","USER"]"#);
        assert_eq!(User::try_from(row).unwrap(), user);
    }
}
