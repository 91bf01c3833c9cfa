use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::calendar::{
    parse_timezone, CalendarError, Interval, TimeOfDay, Window, WorkingDays,
};
use crate::db::StoreError;
use crate::query::QueryError;

// ============================================================================
// General agenda
// ============================================================================

/// Weekly availability template of a business.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralAgenda {
    pub id: Uuid,
    pub business_id: Uuid,
    pub window: Window,
    pub working_days: WorkingDays,
    pub timezone: Tz,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct GeneralAgendaRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub opens_at: i64,
    pub closed_at: i64,
    pub interval_seconds: i64,
    pub working_days: String,
    pub timezone: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl TryFrom<GeneralAgendaRow> for GeneralAgenda {
    type Error = StoreError;

    fn try_from(row: GeneralAgendaRow) -> Result<Self, Self::Error> {
        let corrupt = |e: CalendarError| {
            StoreError::Internal(format!("general agenda {} is corrupt: {e}", row.id))
        };

        let window = Window::new(
            TimeOfDay::try_from(row.opens_at).map_err(corrupt)?,
            TimeOfDay::try_from(row.closed_at).map_err(corrupt)?,
            Interval::try_from(row.interval_seconds).map_err(corrupt)?,
        )
        .map_err(corrupt)?;

        Ok(GeneralAgenda {
            id: row.id,
            business_id: row.business_id,
            window,
            working_days: WorkingDays::from_json(&row.working_days).map_err(corrupt)?,
            timezone: parse_timezone(&row.timezone).map_err(corrupt)?,
            date_created: row.date_created,
            date_updated: row.date_updated,
        })
    }
}

impl From<&GeneralAgenda> for GeneralAgendaRow {
    fn from(agenda: &GeneralAgenda) -> Self {
        GeneralAgendaRow {
            id: agenda.id,
            business_id: agenda.business_id,
            opens_at: agenda.window.opens_at().seconds().into(),
            closed_at: agenda.window.closed_at().seconds().into(),
            interval_seconds: agenda.window.interval().seconds().into(),
            working_days: agenda.working_days.to_json(),
            timezone: agenda.timezone.name().to_string(),
            date_created: agenda.date_created,
            date_updated: agenda.date_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralAgendaDocument {
    pub id: Uuid,
    pub business_id: Uuid,
    pub opens_at: TimeOfDay,
    pub closed_at: TimeOfDay,
    pub interval: Interval,
    pub working_days: WorkingDays,
    pub timezone: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl From<GeneralAgenda> for GeneralAgendaDocument {
    fn from(agenda: GeneralAgenda) -> Self {
        GeneralAgendaDocument {
            id: agenda.id,
            business_id: agenda.business_id,
            opens_at: agenda.window.opens_at(),
            closed_at: agenda.window.closed_at(),
            interval: agenda.window.interval(),
            working_days: agenda.working_days,
            timezone: agenda.timezone.name().to_string(),
            date_created: agenda.date_created,
            date_updated: agenda.date_updated,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGeneralAgenda {
    pub business_id: Uuid,
    pub opens_at: TimeOfDay,
    pub closed_at: TimeOfDay,
    pub interval: Interval,
    pub working_days: WorkingDays,
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralAgendaPatch {
    pub opens_at: Option<TimeOfDay>,
    pub closed_at: Option<TimeOfDay>,
    pub interval: Option<Interval>,
    pub working_days: Option<WorkingDays>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralAgendaFilter {
    pub id: Option<Uuid>,
    pub business_id: Option<Uuid>,
}

pub const GENERAL_AGENDA_ORDER_FIELDS: &[&str] =
    &["id", "business_id", "opens_at", "closed_at", "date_created"];

// ============================================================================
// Daily agenda
// ============================================================================

/// Per-date override of a business's general agenda.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAgenda {
    pub id: Uuid,
    pub business_id: Uuid,
    pub applicable_date: NaiveDate,
    pub opens_at: Option<TimeOfDay>,
    pub closed_at: Option<TimeOfDay>,
    pub interval: Option<Interval>,
    pub availability: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl DailyAgenda {
    pub fn overrides_window(&self) -> bool {
        self.opens_at.is_some() || self.closed_at.is_some() || self.interval.is_some()
    }

    /// Present override fields shadow the general window, absent ones fall
    /// back to it.
    pub fn effective_window(&self, general: &Window) -> Result<Window, CalendarError> {
        Window::new(
            self.opens_at.unwrap_or(general.opens_at()),
            self.closed_at.unwrap_or(general.closed_at()),
            self.interval.unwrap_or(general.interval()),
        )
    }

    /// Checks the override fields that are present against each other. A
    /// complete triple must form a valid window on its own.
    pub fn validate(&self) -> Result<(), CalendarError> {
        if !self.availability {
            return Ok(());
        }
        match (self.opens_at, self.closed_at, self.interval) {
            (Some(opens_at), Some(closed_at), Some(interval)) => {
                Window::new(opens_at, closed_at, interval).map(|_| ())
            }
            (opens_at, closed_at, _) => {
                let opens = opens_at.map(TimeOfDay::seconds);
                let closed = closed_at.map(TimeOfDay::seconds);
                let invalid = opens == Some(0)
                    || matches!((opens, closed), (Some(o), Some(c)) if o >= c);
                if invalid {
                    return Err(CalendarError::InvalidWindow {
                        opens_at: opens.unwrap_or_default(),
                        closed_at: closed.unwrap_or_default(),
                    });
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyAgendaRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub applicable_date: NaiveDate,
    pub opens_at: Option<i64>,
    pub closed_at: Option<i64>,
    pub interval_seconds: Option<i64>,
    pub availability: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl TryFrom<DailyAgendaRow> for DailyAgenda {
    type Error = StoreError;

    fn try_from(row: DailyAgendaRow) -> Result<Self, Self::Error> {
        let corrupt = |e: CalendarError| {
            StoreError::Internal(format!("daily agenda {} is corrupt: {e}", row.id))
        };

        Ok(DailyAgenda {
            id: row.id,
            business_id: row.business_id,
            applicable_date: row.applicable_date,
            opens_at: row.opens_at.map(TimeOfDay::try_from).transpose().map_err(corrupt)?,
            closed_at: row.closed_at.map(TimeOfDay::try_from).transpose().map_err(corrupt)?,
            interval: row
                .interval_seconds
                .map(Interval::try_from)
                .transpose()
                .map_err(corrupt)?,
            availability: row.availability,
            date_created: row.date_created,
            date_updated: row.date_updated,
        })
    }
}

impl From<&DailyAgenda> for DailyAgendaRow {
    fn from(agenda: &DailyAgenda) -> Self {
        DailyAgendaRow {
            id: agenda.id,
            business_id: agenda.business_id,
            applicable_date: agenda.applicable_date,
            opens_at: agenda.opens_at.map(|t| t.seconds().into()),
            closed_at: agenda.closed_at.map(|t| t.seconds().into()),
            interval_seconds: agenda.interval.map(|i| i.seconds().into()),
            availability: agenda.availability,
            date_created: agenda.date_created,
            date_updated: agenda.date_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyAgendaDocument {
    pub id: Uuid,
    pub business_id: Uuid,
    pub applicable_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opens_at: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    pub availability: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl From<DailyAgenda> for DailyAgendaDocument {
    fn from(agenda: DailyAgenda) -> Self {
        DailyAgendaDocument {
            id: agenda.id,
            business_id: agenda.business_id,
            applicable_date: agenda.applicable_date,
            opens_at: agenda.opens_at,
            closed_at: agenda.closed_at,
            interval: agenda.interval,
            availability: agenda.availability,
            date_created: agenda.date_created,
            date_updated: agenda.date_updated,
        }
    }
}

fn default_availability() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDailyAgenda {
    pub business_id: Uuid,
    pub applicable_date: NaiveDate,
    pub opens_at: Option<TimeOfDay>,
    pub closed_at: Option<TimeOfDay>,
    pub interval: Option<Interval>,
    #[serde(default = "default_availability")]
    pub availability: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyAgendaPatch {
    pub opens_at: Option<TimeOfDay>,
    pub closed_at: Option<TimeOfDay>,
    pub interval: Option<Interval>,
    pub availability: Option<bool>,
}

/// Daily agenda filter as accepted from clients. `date` is exclusive with the
/// range fields; it is resolved into [`DailyAgendaCriteria`] before any query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyAgendaFilter {
    pub id: Option<Uuid>,
    pub business_id: Option<Uuid>,
    #[serde(alias = "applicable_date")]
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub days: Option<i64>,
}

pub const MAX_DAILY_AGENDA_DAYS: i64 = 30;

/// Inclusive date constraint on `applicable_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    On(NaiveDate),
    Between(NaiveDate, NaiveDate),
    OnOrAfter(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyAgendaCriteria {
    pub id: Option<Uuid>,
    pub business_id: Option<Uuid>,
    pub dates: DateRange,
}

impl DailyAgendaFilter {
    /// Validates the date groups. `today` is the current UTC date.
    pub fn resolve(&self, today: NaiveDate) -> Result<DailyAgendaCriteria, QueryError> {
        let has_range = self.from.is_some() || self.to.is_some() || self.days.is_some();
        if self.date.is_some() && has_range {
            return Err(QueryError::InvalidFilter(
                "date cannot be combined with from, to or days".to_string(),
            ));
        }
        if self.days.is_some() && (self.from.is_some() || self.to.is_some()) {
            return Err(QueryError::InvalidFilter(
                "days cannot be combined with from and to".to_string(),
            ));
        }

        let dates = match (self.date, self.from, self.to, self.days) {
            (Some(date), ..) => DateRange::On(date),
            (None, Some(from), Some(to), None) => {
                if from > to {
                    return Err(QueryError::InvalidFilter(
                        "from must not be after to".to_string(),
                    ));
                }
                DateRange::Between(from, to)
            }
            (None, Some(_), None, None) | (None, None, Some(_), None) => {
                return Err(QueryError::InvalidFilter(
                    "from and to must be given together".to_string(),
                ));
            }
            (None, None, None, Some(days)) => {
                if !(1..=MAX_DAILY_AGENDA_DAYS).contains(&days) {
                    return Err(QueryError::InvalidFilter(format!(
                        "days must be between 1 and {MAX_DAILY_AGENDA_DAYS}, got {days}"
                    )));
                }
                DateRange::Between(today, today + Duration::days(days - 1))
            }
            _ => DateRange::OnOrAfter(today),
        };

        Ok(DailyAgendaCriteria {
            id: self.id,
            business_id: self.business_id,
            dates,
        })
    }
}

pub const DAILY_AGENDA_ORDER_FIELDS: &[&str] =
    &["id", "business_id", "applicable_date", "date_created"];

#[cfg(test)]
mod tests {
    use super::*;

    fn window(opens: i64, closed: i64, interval: i64) -> Window {
        Window::new(
            TimeOfDay::try_from(opens).unwrap(),
            TimeOfDay::try_from(closed).unwrap(),
            Interval::try_from(interval).unwrap(),
        )
        .unwrap()
    }

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn daily(opens: Option<i64>, closed: Option<i64>, interval: Option<i64>) -> DailyAgenda {
        let now = Utc::now();
        DailyAgenda {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            applicable_date: date("2030-06-03"),
            opens_at: opens.map(|v| TimeOfDay::try_from(v).unwrap()),
            closed_at: closed.map(|v| TimeOfDay::try_from(v).unwrap()),
            interval: interval.map(|v| Interval::try_from(v).unwrap()),
            availability: true,
            date_created: now,
            date_updated: now,
        }
    }

    #[test]
    fn general_agenda_row_round_trip() {
        let now = Utc::now();
        let agenda = GeneralAgenda {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            window: window(32_400, 61_200, 1_800),
            working_days: WorkingDays::try_from(vec![5i64, 1, 3]).unwrap(),
            timezone: chrono_tz::America::New_York,
            date_created: now,
            date_updated: now,
        };

        let row = GeneralAgendaRow::from(&agenda);
        assert_eq!(row.working_days, "[1,3,5]");
        assert_eq!(row.timezone, "America/New_York");
        assert_eq!(GeneralAgenda::try_from(row).unwrap(), agenda);
    }

    #[test]
    fn corrupt_rows_surface_as_internal() {
        let now = Utc::now();
        let row = GeneralAgendaRow {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            opens_at: 32_400,
            closed_at: 61_200,
            interval_seconds: 1_800,
            working_days: "[9]".to_string(),
            timezone: "UTC".to_string(),
            date_created: now,
            date_updated: now,
        };
        assert!(matches!(
            GeneralAgenda::try_from(row),
            Err(StoreError::Internal(_))
        ));
    }

    #[test]
    fn daily_row_round_trip_keeps_absent_fields_absent() {
        let agenda = daily(Some(36_000), None, None);
        let row = DailyAgendaRow::from(&agenda);
        assert_eq!(row.closed_at, None);
        assert_eq!(DailyAgenda::try_from(row).unwrap(), agenda);
    }

    #[test]
    fn daily_override_merges_field_by_field() {
        let general = window(32_400, 61_200, 1_800);

        let merged = daily(Some(36_000), None, None)
            .effective_window(&general)
            .unwrap();
        assert_eq!(merged.opens_at().seconds(), 36_000);
        assert_eq!(merged.closed_at().seconds(), 61_200);
        assert_eq!(merged.interval().seconds(), 1_800);

        let merged = daily(None, None, Some(3_600))
            .effective_window(&general)
            .unwrap();
        assert_eq!(merged.slot_count(), 8);

        // 09:00..17:00 does not split into 7 hour slots
        assert!(daily(None, None, Some(25_200))
            .effective_window(&general)
            .is_err());
    }

    #[test]
    fn daily_validation_checks_present_fields() {
        assert!(daily(None, None, None).validate().is_ok());
        assert!(daily(Some(36_000), Some(50_400), Some(3_600)).validate().is_ok());
        assert!(daily(Some(50_400), Some(36_000), None).validate().is_err());
        assert!(daily(Some(0), None, None).validate().is_err());
        assert!(daily(Some(36_000), Some(50_400), Some(5_000)).validate().is_err());

        let mut closed = daily(Some(50_400), Some(36_000), None);
        closed.availability = false;
        assert!(closed.validate().is_ok());
    }

    #[test]
    fn daily_filter_date_groups() {
        let today = date("2030-06-01");

        let criteria = DailyAgendaFilter::default().resolve(today).unwrap();
        assert_eq!(criteria.dates, DateRange::OnOrAfter(today));

        let filter = DailyAgendaFilter {
            days: Some(7),
            ..Default::default()
        };
        assert_eq!(
            filter.resolve(today).unwrap().dates,
            DateRange::Between(today, date("2030-06-07"))
        );

        let filter = DailyAgendaFilter {
            date: Some(date("2030-06-03")),
            from: Some(date("2030-06-01")),
            ..Default::default()
        };
        assert!(filter.resolve(today).is_err());

        let filter = DailyAgendaFilter {
            from: Some(date("2030-06-01")),
            ..Default::default()
        };
        assert!(filter.resolve(today).is_err());

        for days in [0, 31] {
            let filter = DailyAgendaFilter {
                days: Some(days),
                ..Default::default()
            };
            assert!(filter.resolve(today).is_err());
        }

        let filter = DailyAgendaFilter {
            from: Some(date("2030-06-02")),
            to: Some(date("2030-06-09")),
            ..Default::default()
        };
        assert_eq!(
            filter.resolve(today).unwrap().dates,
            DateRange::Between(date("2030-06-02"), date("2030-06-09"))
        );
    }
}
