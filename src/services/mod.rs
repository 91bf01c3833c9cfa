pub mod agenda;
pub mod appointment;
pub mod auth;
pub mod business;
pub mod init;
pub mod policy;
pub mod ports;
pub mod reminder;
pub mod users;

use crate::db::StoreError;
use crate::error::AppError;

/// Translates a store `NotFound` into the given domain error and any other
/// store failure through the default conversion.
pub(crate) fn map_not_found(e: StoreError, not_found: AppError) -> AppError {
    match e {
        StoreError::NotFound => not_found,
        other => other.into(),
    }
}
