use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::StoreError;
use crate::query::QueryError;

/// Appointment status. Stored as a small integer; `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
}

impl AppointmentStatus {
    pub fn code(self) -> i64 {
        match self {
            AppointmentStatus::Scheduled => 0,
            AppointmentStatus::Cancelled => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Cancelled => "Cancelled",
        }
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
        )
    }
}

impl TryFrom<i64> for AppointmentStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AppointmentStatus::Scheduled),
            1 => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status code {other}")),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(AppointmentStatus::Scheduled),
            "Cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status {other:?}")),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appointment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub status: AppointmentStatus,
    pub scheduled_on: DateTime<Utc>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub status: i64,
    pub scheduled_on: DateTime<Utc>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::try_from(row.status)
            .map_err(|e| StoreError::Internal(format!("appointment {}: {e}", row.id)))?;

        Ok(Appointment {
            id: row.id,
            business_id: row.business_id,
            user_id: row.user_id,
            status,
            scheduled_on: row.scheduled_on,
            date_created: row.date_created,
            date_updated: row.date_updated,
        })
    }
}

impl From<&Appointment> for AppointmentRow {
    fn from(appointment: &Appointment) -> Self {
        AppointmentRow {
            id: appointment.id,
            business_id: appointment.business_id,
            user_id: appointment.user_id,
            status: appointment.status.code(),
            scheduled_on: appointment.scheduled_on,
            date_created: appointment.date_created,
            date_updated: appointment.date_updated,
        }
    }
}

fn default_status() -> AppointmentStatus {
    AppointmentStatus::Scheduled
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub business_id: Uuid,
    pub user_id: Uuid,
    #[serde(default = "default_status")]
    pub status: AppointmentStatus,
    pub scheduled_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub scheduled_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub id: Option<Uuid>,
    pub business_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub scheduled_on: Option<DateTime<Utc>>,
    pub start_created_date: Option<DateTime<Utc>>,
    pub end_created_date: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn validate(&self) -> Result<(), QueryError> {
        if let (Some(start), Some(end)) = (self.start_created_date, self.end_created_date) {
            if start > end {
                return Err(QueryError::InvalidFilter(
                    "start_created_date must not be after end_created_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub const APPOINTMENT_ORDER_FIELDS: &[&str] = &[
    "id",
    "business_id",
    "user_id",
    "status",
    "scheduled_on",
    "date_created",
];
