//! General and daily agendas of a business and the boundary check that decides
//! whether an instant is a bookable slot.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::calendar::{anchor, parse_timezone, project, Day, Window};
use crate::db::models::*;
use crate::db::{DailyAgendaStore, GeneralAgendaStore, StoreError, Tx};
use crate::error::{AppError, AppResult};
use crate::query::{OrderBy, Page};
use crate::services::auth::Claims;
use crate::services::map_not_found;
use crate::services::ports::BusinessPort;

/// Which agendas an instant is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformancePolicy {
    DailyOnly,
    GeneralOnly,
    /// Daily agenda when one exists for the date, general agenda otherwise.
    DailyFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    #[error("no daily agenda for the date")]
    NoDailyAgenda,

    #[error("instant is not on an open slot")]
    OutsideAgenda,
}

impl From<BoundaryError> for AppError {
    fn from(e: BoundaryError) -> Self {
        match e {
            BoundaryError::NoDailyAgenda => AppError::NoDailyAgenda,
            BoundaryError::OutsideAgenda => AppError::OutsideAgenda,
        }
    }
}

/// Checks `t` against the agendas of one business. `daily` must be the daily
/// agenda for the local date of `t` in the general agenda's timezone, if any.
pub fn conforms(
    general: &GeneralAgenda,
    daily: Option<&DailyAgenda>,
    t: DateTime<Utc>,
    policy: ConformancePolicy,
) -> Result<(), BoundaryError> {
    let local = project(t, general.timezone);

    let check_daily = || -> Result<(), BoundaryError> {
        let daily = daily.ok_or(BoundaryError::NoDailyAgenda)?;
        if !daily.availability {
            return Err(BoundaryError::OutsideAgenda);
        }
        let window = daily
            .effective_window(&general.window)
            .map_err(|_| BoundaryError::OutsideAgenda)?;
        admit(&window, local.seconds, local.nanos)
    };

    let check_general = || -> Result<(), BoundaryError> {
        if !general.working_days.contains(local.day()) {
            return Err(BoundaryError::OutsideAgenda);
        }
        admit(&general.window, local.seconds, local.nanos)
    };

    match policy {
        ConformancePolicy::DailyOnly => check_daily(),
        ConformancePolicy::GeneralOnly => check_general(),
        ConformancePolicy::DailyFirst => match check_daily() {
            Err(BoundaryError::NoDailyAgenda) => check_general(),
            other => other,
        },
    }
}

fn admit(window: &Window, seconds: u32, nanos: u32) -> Result<(), BoundaryError> {
    if nanos == 0 && window.admits(seconds) {
        Ok(())
    } else {
        Err(BoundaryError::OutsideAgenda)
    }
}

// ============================================================================
// Agenda service
// ============================================================================

#[derive(Clone)]
pub struct AgendaService {
    general: Arc<dyn GeneralAgendaStore>,
    daily: Arc<dyn DailyAgendaStore>,
    businesses: Arc<dyn BusinessPort>,
}

impl AgendaService {
    pub fn new(
        general: Arc<dyn GeneralAgendaStore>,
        daily: Arc<dyn DailyAgendaStore>,
        businesses: Arc<dyn BusinessPort>,
    ) -> Self {
        AgendaService {
            general,
            daily,
            businesses,
        }
    }

    pub fn with_transaction(&self, tx: &Tx) -> AgendaService {
        AgendaService {
            general: self.general.with_transaction(tx),
            daily: self.daily.with_transaction(tx),
            businesses: self.businesses.with_transaction(tx),
        }
    }

    /// Only the owner of a business may shape its agendas.
    async fn ensure_owner(&self, claims: &Claims, business_id: Uuid) -> AppResult<()> {
        let business = self
            .businesses
            .query_by_id(business_id)
            .await
            .map_err(|e| map_not_found(e, AppError::BusinessNotFound))?;

        if business.owner_id != claims.sub {
            tracing::debug!(
                "Subject {} is not the owner of business {}",
                claims.sub,
                business_id
            );
            return Err(AppError::PermissionDenied);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // General agendas
    // ------------------------------------------------------------------------

    pub async fn create_general(
        &self,
        claims: &Claims,
        new: NewGeneralAgenda,
        now: DateTime<Utc>,
    ) -> AppResult<GeneralAgenda> {
        self.ensure_owner(claims, new.business_id).await?;

        let agenda = GeneralAgenda {
            id: Uuid::new_v4(),
            business_id: new.business_id,
            window: Window::new(new.opens_at, new.closed_at, new.interval)?,
            working_days: new.working_days,
            timezone: parse_timezone(&new.timezone)?,
            date_created: now,
            date_updated: now,
        };

        self.general.create(&agenda).await.map_err(|e| match e {
            StoreError::Conflict => {
                AppError::Conflict("business already has a general agenda".to_string())
            }
            other => other.into(),
        })?;

        tracing::info!(
            "Created general agenda {} for business {}",
            agenda.id,
            agenda.business_id
        );
        Ok(agenda)
    }

    pub async fn update_general(
        &self,
        claims: &Claims,
        existing: GeneralAgenda,
        patch: GeneralAgendaPatch,
        now: DateTime<Utc>,
    ) -> AppResult<GeneralAgenda> {
        self.ensure_owner(claims, existing.business_id).await?;

        let window = Window::new(
            patch.opens_at.unwrap_or(existing.window.opens_at()),
            patch.closed_at.unwrap_or(existing.window.closed_at()),
            patch.interval.unwrap_or(existing.window.interval()),
        )?;
        let timezone = match patch.timezone {
            Some(name) => parse_timezone(&name)?,
            None => existing.timezone,
        };

        let agenda = GeneralAgenda {
            window,
            timezone,
            working_days: patch.working_days.unwrap_or(existing.working_days),
            date_updated: now,
            ..existing
        };

        self.general
            .update(&agenda)
            .await
            .map_err(|e| map_not_found(e, general_not_found(agenda.id)))?;
        Ok(agenda)
    }

    /// Appointments already booked against the agenda are left untouched.
    pub async fn delete_general(&self, claims: &Claims, existing: &GeneralAgenda) -> AppResult<()> {
        self.ensure_owner(claims, existing.business_id).await?;
        self.general
            .delete(existing.id)
            .await
            .map_err(|e| map_not_found(e, general_not_found(existing.id)))?;
        tracing::info!("Deleted general agenda {}", existing.id);
        Ok(())
    }

    pub async fn query_general(
        &self,
        filter: &GeneralAgendaFilter,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<GeneralAgenda>> {
        Ok(self.general.query(filter, order, page).await?)
    }

    pub async fn count_general(&self, filter: &GeneralAgendaFilter) -> AppResult<i64> {
        Ok(self.general.count(filter).await?)
    }

    pub async fn query_general_by_id(&self, id: Uuid) -> AppResult<GeneralAgenda> {
        self.general
            .query_by_id(id)
            .await
            .map_err(|e| map_not_found(e, general_not_found(id)))
    }

    // ------------------------------------------------------------------------
    // Daily agendas
    // ------------------------------------------------------------------------

    /// Validates a daily agenda on its own and, when the business has a
    /// general agenda, the window it produces once merged with it.
    async fn validate_daily(&self, agenda: &DailyAgenda) -> AppResult<()> {
        agenda.validate()?;
        if !agenda.availability || !agenda.overrides_window() {
            return Ok(());
        }

        match self.general.query_by_business_id(agenda.business_id).await {
            Ok(general) => {
                agenda.effective_window(&general.window)?;
                Ok(())
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_daily(
        &self,
        claims: &Claims,
        new: NewDailyAgenda,
        now: DateTime<Utc>,
    ) -> AppResult<DailyAgenda> {
        self.ensure_owner(claims, new.business_id).await?;

        let agenda = DailyAgenda {
            id: Uuid::new_v4(),
            business_id: new.business_id,
            applicable_date: new.applicable_date,
            opens_at: new.opens_at,
            closed_at: new.closed_at,
            interval: new.interval,
            availability: new.availability,
            date_created: now,
            date_updated: now,
        };
        self.validate_daily(&agenda).await?;

        self.daily.create(&agenda).await.map_err(|e| match e {
            StoreError::Conflict => AppError::Conflict(format!(
                "business already has a daily agenda for {}",
                agenda.applicable_date
            )),
            other => other.into(),
        })?;

        tracing::info!(
            "Created daily agenda {} for business {} on {}",
            agenda.id,
            agenda.business_id,
            agenda.applicable_date
        );
        Ok(agenda)
    }

    pub async fn update_daily(
        &self,
        claims: &Claims,
        existing: DailyAgenda,
        patch: DailyAgendaPatch,
        now: DateTime<Utc>,
    ) -> AppResult<DailyAgenda> {
        self.ensure_owner(claims, existing.business_id).await?;

        let agenda = DailyAgenda {
            opens_at: patch.opens_at.or(existing.opens_at),
            closed_at: patch.closed_at.or(existing.closed_at),
            interval: patch.interval.or(existing.interval),
            availability: patch.availability.unwrap_or(existing.availability),
            date_updated: now,
            ..existing
        };
        self.validate_daily(&agenda).await?;

        self.daily
            .update(&agenda)
            .await
            .map_err(|e| map_not_found(e, daily_not_found(agenda.id)))?;
        Ok(agenda)
    }

    pub async fn delete_daily(&self, claims: &Claims, existing: &DailyAgenda) -> AppResult<()> {
        self.ensure_owner(claims, existing.business_id).await?;
        self.daily
            .delete(existing.id)
            .await
            .map_err(|e| map_not_found(e, daily_not_found(existing.id)))?;
        tracing::info!("Deleted daily agenda {}", existing.id);
        Ok(())
    }

    pub async fn query_daily(
        &self,
        filter: &DailyAgendaFilter,
        today: NaiveDate,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<DailyAgenda>> {
        let criteria = filter.resolve(today)?;
        Ok(self.daily.query(&criteria, order, page).await?)
    }

    pub async fn count_daily(&self, filter: &DailyAgendaFilter, today: NaiveDate) -> AppResult<i64> {
        let criteria = filter.resolve(today)?;
        Ok(self.daily.count(&criteria).await?)
    }

    pub async fn query_daily_by_id(&self, id: Uuid) -> AppResult<DailyAgenda> {
        self.daily
            .query_by_id(id)
            .await
            .map_err(|e| map_not_found(e, daily_not_found(id)))
    }

    // ------------------------------------------------------------------------
    // Boundary conformance
    // ------------------------------------------------------------------------

    async fn general_for(&self, business_id: Uuid) -> AppResult<GeneralAgenda> {
        self.general
            .query_by_business_id(business_id)
            .await
            .map_err(|e| map_not_found(e, AppError::NoGeneralAgenda))
    }

    async fn daily_for(&self, business_id: Uuid, date: NaiveDate) -> AppResult<Option<DailyAgenda>> {
        match self.daily.query_by_business_date(business_id, date).await {
            Ok(agenda) => Ok(Some(agenda)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fails unless `t` is an open slot of the business, checking the daily
    /// agenda of its local date first and the general agenda otherwise.
    pub async fn check_boundary(&self, business_id: Uuid, t: DateTime<Utc>) -> AppResult<()> {
        let general = self.general_for(business_id).await?;
        let date = project(t, general.timezone).date;
        let daily = self.daily_for(business_id, date).await?;

        conforms(&general, daily.as_ref(), t, ConformancePolicy::DailyFirst)?;
        Ok(())
    }

    /// UTC start of every open slot on a local date of the business. Wall-clock
    /// times skipped by a DST transition are left out.
    pub async fn slots_for_date(
        &self,
        business_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let general = self.general_for(business_id).await?;

        let window = match self.daily_for(business_id, date).await? {
            Some(daily) if !daily.availability => return Ok(Vec::new()),
            Some(daily) => match daily.effective_window(&general.window) {
                Ok(window) => window,
                Err(_) => return Ok(Vec::new()),
            },
            None if !general.working_days.contains(Day::of(date)) => return Ok(Vec::new()),
            None => general.window,
        };

        Ok(window
            .slots()
            .filter_map(|tod| anchor(date, tod, general.timezone))
            .collect())
    }
}

fn general_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("general agenda {id} not found"))
}

fn daily_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("daily agenda {id} not found"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sqlx::SqlitePool;

    use super::*;
    use crate::calendar::{Interval, TimeOfDay, WorkingDays};
    use crate::db::repository::testing::{seed_business, seed_user};
    use crate::db::repository::{BusinessRepository, DailyAgendaRepository, GeneralAgendaRepository};
    use crate::db::testing::memory_pool;
    use crate::services::ports::BusinessDirectory;

    fn tod(seconds: i64) -> TimeOfDay {
        TimeOfDay::try_from(seconds).unwrap()
    }

    fn interval(seconds: i64) -> Interval {
        Interval::try_from(seconds).unwrap()
    }

    fn weekdays() -> WorkingDays {
        WorkingDays::try_from(vec![1i64, 2, 3, 4, 5]).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 09:00 to 17:00 in 30 minute slots, Monday to Friday.
    fn office_hours(timezone: &str) -> GeneralAgenda {
        GeneralAgenda {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            window: Window::new(tod(32_400), tod(61_200), interval(1_800)).unwrap(),
            working_days: weekdays(),
            timezone: parse_timezone(timezone).unwrap(),
            date_created: Utc::now(),
            date_updated: Utc::now(),
        }
    }

    fn daily(general: &GeneralAgenda, on: NaiveDate, availability: bool) -> DailyAgenda {
        DailyAgenda {
            id: Uuid::new_v4(),
            business_id: general.business_id,
            applicable_date: on,
            opens_at: None,
            closed_at: None,
            interval: None,
            availability,
            date_created: Utc::now(),
            date_updated: Utc::now(),
        }
    }

    fn claims_for(sub: Uuid) -> Claims {
        Claims {
            sub,
            roles: vec![Role::User],
            iss: "test".to_string(),
            iat: 0,
            exp: 0,
        }
    }

    fn service(pool: &SqlitePool) -> AgendaService {
        AgendaService::new(
            Arc::new(GeneralAgendaRepository::new(pool.clone())),
            Arc::new(DailyAgendaRepository::new(pool.clone())),
            Arc::new(BusinessDirectory(Arc::new(BusinessRepository::new(
                pool.clone(),
            )))),
        )
    }

    fn new_general(business_id: Uuid) -> NewGeneralAgenda {
        NewGeneralAgenda {
            business_id,
            opens_at: tod(32_400),
            closed_at: tod(61_200),
            interval: interval(1_800),
            working_days: weekdays(),
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn general_agenda_admits_aligned_weekday_slots() {
        use ConformancePolicy::*;
        let general = office_hours("UTC");

        // 2030-06-03 is a Monday.
        assert_eq!(conforms(&general, None, utc(2030, 6, 3, 9, 0), DailyFirst), Ok(()));
        assert_eq!(conforms(&general, None, utc(2030, 6, 3, 16, 30), DailyFirst), Ok(()));
        assert_eq!(
            conforms(&general, None, utc(2030, 6, 3, 17, 0), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );
        assert_eq!(
            conforms(&general, None, utc(2030, 6, 3, 10, 15), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );
        assert_eq!(
            conforms(&general, None, utc(2030, 6, 3, 8, 30), GeneralOnly),
            Err(BoundaryError::OutsideAgenda)
        );
        // Saturday.
        assert_eq!(
            conforms(&general, None, utc(2030, 6, 8, 10, 0), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );

        let off_by_a_millisecond = utc(2030, 6, 3, 10, 0) + chrono::Duration::milliseconds(1);
        assert_eq!(
            conforms(&general, None, off_by_a_millisecond, DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );
    }

    #[test]
    fn daily_agenda_shadows_general_fields() {
        use ConformancePolicy::*;
        let general = office_hours("UTC");
        let monday = date(2030, 6, 3);

        assert_eq!(
            conforms(&general, None, utc(2030, 6, 3, 10, 0), DailyOnly),
            Err(BoundaryError::NoDailyAgenda)
        );

        let closed = daily(&general, monday, false);
        assert_eq!(
            conforms(&general, Some(&closed), utc(2030, 6, 3, 10, 0), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );

        let mut early = daily(&general, monday, true);
        early.opens_at = Some(tod(28_800));
        assert_eq!(
            conforms(&general, Some(&early), utc(2030, 6, 3, 8, 0), DailyFirst),
            Ok(())
        );
        assert_eq!(
            conforms(&general, None, utc(2030, 6, 3, 8, 0), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );

        let mut hourly = daily(&general, monday, true);
        hourly.interval = Some(interval(3_600));
        assert_eq!(
            conforms(&general, Some(&hourly), utc(2030, 6, 3, 9, 30), DailyFirst),
            Err(BoundaryError::OutsideAgenda)
        );

        // An override on a non-working day opens it.
        let saturday = daily(&general, date(2030, 6, 8), true);
        assert_eq!(
            conforms(&general, Some(&saturday), utc(2030, 6, 8, 10, 0), DailyFirst),
            Ok(())
        );
    }

    #[test]
    fn instants_are_projected_into_the_agenda_timezone() {
        let general = office_hours("America/New_York");

        // 14:00 UTC is 10:00 EDT on Monday 2030-06-03.
        assert_eq!(
            conforms(
                &general,
                None,
                utc(2030, 6, 3, 14, 0),
                ConformancePolicy::DailyFirst
            ),
            Ok(())
        );
        // 10:00 UTC is 06:00 local.
        assert_eq!(
            conforms(
                &general,
                None,
                utc(2030, 6, 3, 10, 0),
                ConformancePolicy::DailyFirst
            ),
            Err(BoundaryError::OutsideAgenda)
        );
    }

    #[tokio::test]
    async fn only_the_owner_shapes_agendas() {
        let pool = memory_pool().await;
        let owner = seed_user(&pool, "owner@example.com", "+14155550100").await;
        let other = seed_user(&pool, "other@example.com", "+14155550101").await;
        let business = seed_business(&pool, owner.id).await;
        let agendas = service(&pool);
        let now = Utc::now();

        assert!(matches!(
            agendas
                .create_general(&claims_for(other.id), new_general(business.id), now)
                .await,
            Err(AppError::PermissionDenied)
        ));
        assert!(matches!(
            agendas
                .create_general(&claims_for(owner.id), new_general(Uuid::new_v4()), now)
                .await,
            Err(AppError::BusinessNotFound)
        ));

        let mut uneven = new_general(business.id);
        uneven.interval = interval(7_000);
        assert!(matches!(
            agendas.create_general(&claims_for(owner.id), uneven, now).await,
            Err(AppError::InvalidArgument(_))
        ));

        let mut bad_zone = new_general(business.id);
        bad_zone.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            agendas.create_general(&claims_for(owner.id), bad_zone, now).await,
            Err(AppError::InvalidArgument(_))
        ));

        let created = agendas
            .create_general(&claims_for(owner.id), new_general(business.id), now)
            .await
            .unwrap();
        assert!(matches!(
            agendas
                .create_general(&claims_for(owner.id), new_general(business.id), now)
                .await,
            Err(AppError::Conflict(_))
        ));

        let patch = GeneralAgendaPatch {
            closed_at: Some(tod(64_800)),
            ..Default::default()
        };
        let updated = agendas
            .update_general(&claims_for(owner.id), created.clone(), patch, now)
            .await
            .unwrap();
        assert_eq!(updated.window.closed_at(), tod(64_800));
        assert_eq!(updated.window.opens_at(), tod(32_400));

        let broken = GeneralAgendaPatch {
            opens_at: Some(tod(70_000)),
            ..Default::default()
        };
        assert!(matches!(
            agendas
                .update_general(&claims_for(owner.id), updated.clone(), broken, now)
                .await,
            Err(AppError::InvalidArgument(_))
        ));

        assert_eq!(agendas.query_general_by_id(created.id).await.unwrap(), updated);

        agendas
            .delete_general(&claims_for(owner.id), &updated)
            .await
            .unwrap();
        assert!(matches!(
            agendas.query_general_by_id(created.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn daily_overrides_are_checked_against_the_general_window() {
        let pool = memory_pool().await;
        let owner = seed_user(&pool, "owner@example.com", "+14155550100").await;
        let business = seed_business(&pool, owner.id).await;
        let agendas = service(&pool);
        let claims = claims_for(owner.id);
        let now = Utc::now();

        agendas
            .create_general(&claims, new_general(business.id), now)
            .await
            .unwrap();

        // Closing at 09:00 would put it before the general opening time.
        let invalid = NewDailyAgenda {
            business_id: business.id,
            applicable_date: date(2030, 6, 3),
            opens_at: None,
            closed_at: Some(tod(32_400)),
            interval: None,
            availability: true,
        };
        assert!(matches!(
            agendas.create_daily(&claims, invalid, now).await,
            Err(AppError::InvalidArgument(_))
        ));

        let shorter = NewDailyAgenda {
            business_id: business.id,
            applicable_date: date(2030, 6, 3),
            opens_at: None,
            closed_at: Some(tod(43_200)),
            interval: None,
            availability: true,
        };
        let created = agendas.create_daily(&claims, shorter.clone(), now).await.unwrap();
        assert!(matches!(
            agendas.create_daily(&claims, shorter, now).await,
            Err(AppError::Conflict(_))
        ));

        let slots = agendas
            .slots_for_date(business.id, date(2030, 6, 3))
            .await
            .unwrap();
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0], utc(2030, 6, 3, 9, 0));
        assert_eq!(slots[5], utc(2030, 6, 3, 11, 30));

        let closed = agendas
            .update_daily(
                &claims,
                created,
                DailyAgendaPatch {
                    availability: Some(false),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert!(!closed.availability);
        assert_eq!(closed.closed_at, Some(tod(43_200)));
        assert!(agendas
            .slots_for_date(business.id, date(2030, 6, 3))
            .await
            .unwrap()
            .is_empty());

        assert!(matches!(
            agendas.check_boundary(business.id, utc(2030, 6, 3, 10, 0)).await,
            Err(AppError::OutsideAgenda)
        ));
        agendas
            .check_boundary(business.id, utc(2030, 6, 4, 10, 0))
            .await
            .unwrap();

        let today = date(2030, 6, 1);
        let filter = DailyAgendaFilter {
            business_id: Some(business.id),
            days: Some(7),
            ..Default::default()
        };
        assert_eq!(agendas.count_daily(&filter, today).await.unwrap(), 1);
        let too_far = DailyAgendaFilter {
            days: Some(31),
            ..Default::default()
        };
        assert!(matches!(
            agendas.count_daily(&too_far, today).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn boundary_requires_a_general_agenda() {
        let pool = memory_pool().await;
        let owner = seed_user(&pool, "owner@example.com", "+14155550100").await;
        let business = seed_business(&pool, owner.id).await;
        let agendas = service(&pool);

        assert!(matches!(
            agendas.check_boundary(business.id, utc(2030, 6, 3, 10, 0)).await,
            Err(AppError::NoGeneralAgenda)
        ));
        assert!(matches!(
            agendas.slots_for_date(business.id, date(2030, 6, 3)).await,
            Err(AppError::NoGeneralAgenda)
        ));
    }
}
