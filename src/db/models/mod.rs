//! Database models, one module per table. Everything is re-exported at
//! `crate::db::models` so callers can `use crate::db::models::*;`.

pub mod agenda;
pub mod appointment;
pub mod business;
pub mod reminder_task;
pub mod user;

pub use self::agenda::*;
pub use self::appointment::*;
pub use self::business::*;
pub use self::reminder_task::*;
pub use self::user::*;
