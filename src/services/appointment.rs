use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{AppointmentStore, StoreError, Tx};
use crate::error::{AppError, AppResult};
use crate::query::{Direction, OrderBy, Page};
use crate::services::agenda::AgendaService;
use crate::services::map_not_found;
use crate::services::ports::{BusinessPort, UserPort};
use crate::services::reminder::AppointmentEvent;

/// Appointment lifecycle: booking, rescheduling, cancellation and deletion.
///
/// Mutations return the [`AppointmentEvent`] the caller publishes to the
/// reminder coordinator once its transaction has committed.
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    users: Arc<dyn UserPort>,
    businesses: Arc<dyn BusinessPort>,
    agenda: AgendaService,
}

impl AppointmentService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        users: Arc<dyn UserPort>,
        businesses: Arc<dyn BusinessPort>,
        agenda: AgendaService,
    ) -> Self {
        AppointmentService {
            store,
            users,
            businesses,
            agenda,
        }
    }

    pub fn with_transaction(&self, tx: &Tx) -> AppointmentService {
        AppointmentService {
            store: self.store.with_transaction(tx),
            users: self.users.with_transaction(tx),
            businesses: self.businesses.with_transaction(tx),
            agenda: self.agenda.with_transaction(tx),
        }
    }

    /// Fails with `AlreadyReserved` when another scheduled appointment holds
    /// the slot. The unique index on scheduled slots stays the final word.
    async fn ensure_slot_free(
        &self,
        business_id: Uuid,
        scheduled_on: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        let filter = AppointmentFilter {
            business_id: Some(business_id),
            scheduled_on: Some(scheduled_on),
            status: Some(AppointmentStatus::Scheduled),
            ..Default::default()
        };
        let holders = self
            .store
            .query(&filter, OrderBy::new("id", Direction::Asc), Page::first(2))
            .await?;

        match holders.iter().filter(|a| Some(a.id) != exclude).count() {
            0 => Ok(()),
            1 => Err(AppError::AlreadyReserved),
            n => Err(AppError::Internal(anyhow::anyhow!(
                "{n} scheduled appointments share slot {scheduled_on} of business {business_id}"
            ))),
        }
    }

    pub async fn create(
        &self,
        new: NewAppointment,
        now: DateTime<Utc>,
    ) -> AppResult<(Appointment, AppointmentEvent)> {
        let user = self
            .users
            .query_by_id(new.user_id)
            .await
            .map_err(|e| map_not_found(e, AppError::UserNotFound))?;
        if !user.enabled {
            return Err(AppError::UserDisabled);
        }

        self.businesses
            .query_by_id(new.business_id)
            .await
            .map_err(|e| map_not_found(e, AppError::BusinessNotFound))?;

        if new.status != AppointmentStatus::Scheduled {
            return Err(AppError::InvalidArgument(
                "new appointments must be Scheduled".to_string(),
            ));
        }
        if new.scheduled_on <= now {
            return Err(AppError::PastTime);
        }

        self.agenda
            .check_boundary(new.business_id, new.scheduled_on)
            .await?;
        self.ensure_slot_free(new.business_id, new.scheduled_on, None)
            .await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            business_id: new.business_id,
            user_id: new.user_id,
            status: AppointmentStatus::Scheduled,
            scheduled_on: new.scheduled_on,
            date_created: now,
            date_updated: now,
        };

        self.store.create(&appointment).await.map_err(|e| match e {
            StoreError::Conflict => AppError::AlreadyReserved,
            other => other.into(),
        })?;

        tracing::info!(
            "Booked appointment {} at {} with business {}",
            appointment.id,
            appointment.scheduled_on,
            appointment.business_id
        );

        let event = AppointmentEvent::Scheduled {
            id: appointment.id,
            user_id: appointment.user_id,
            scheduled_on: appointment.scheduled_on,
        };
        Ok((appointment, event))
    }

    /// Applies a status change and/or a reschedule. Past and cancelled
    /// appointments are frozen.
    pub async fn update(
        &self,
        existing: Appointment,
        patch: AppointmentPatch,
        now: DateTime<Utc>,
    ) -> AppResult<(Appointment, Option<AppointmentEvent>)> {
        if existing.scheduled_on < now {
            return Err(AppError::PastTime);
        }
        if existing.status == AppointmentStatus::Cancelled {
            return Err(AppError::AlreadyCancelled);
        }

        let mut updated = existing.clone();

        if let Some(status) = patch.status {
            if !existing.status.can_transition_to(status) {
                return Err(AppError::InvalidArgument(format!(
                    "cannot change status from {} to {}",
                    existing.status, status
                )));
            }
            updated.status = status;
        }

        let rescheduled = match patch.scheduled_on {
            Some(scheduled_on) if scheduled_on != existing.scheduled_on => {
                if updated.status == AppointmentStatus::Cancelled {
                    return Err(AppError::InvalidArgument(
                        "an appointment cannot be cancelled and rescheduled at once".to_string(),
                    ));
                }
                if scheduled_on <= now {
                    return Err(AppError::PastTime);
                }
                self.agenda
                    .check_boundary(existing.business_id, scheduled_on)
                    .await?;
                self.ensure_slot_free(existing.business_id, scheduled_on, Some(existing.id))
                    .await?;
                updated.scheduled_on = scheduled_on;
                true
            }
            _ => false,
        };

        updated.date_updated = now;

        self.store.update(&updated).await.map_err(|e| match e {
            StoreError::Conflict => AppError::AlreadyReserved,
            other => map_not_found(other, appointment_not_found(updated.id)),
        })?;

        let event = if updated.status == AppointmentStatus::Cancelled {
            tracing::info!("Cancelled appointment {}", updated.id);
            Some(AppointmentEvent::Cancelled { id: updated.id })
        } else if rescheduled {
            tracing::info!(
                "Rescheduled appointment {} from {} to {}",
                updated.id,
                existing.scheduled_on,
                updated.scheduled_on
            );
            Some(AppointmentEvent::Rescheduled {
                id: updated.id,
                user_id: updated.user_id,
                scheduled_on: updated.scheduled_on,
            })
        } else {
            None
        };

        Ok((updated, event))
    }

    pub async fn delete(&self, existing: &Appointment) -> AppResult<AppointmentEvent> {
        self.store
            .delete(existing.id)
            .await
            .map_err(|e| map_not_found(e, appointment_not_found(existing.id)))?;
        tracing::info!("Deleted appointment {}", existing.id);
        Ok(AppointmentEvent::Deleted { id: existing.id })
    }

    pub async fn query(
        &self,
        filter: &AppointmentFilter,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<Appointment>> {
        filter.validate()?;
        Ok(self.store.query(filter, order, page).await?)
    }

    pub async fn count(&self, filter: &AppointmentFilter) -> AppResult<i64> {
        filter.validate()?;
        Ok(self.store.count(filter).await?)
    }

    pub async fn query_by_id(&self, id: Uuid) -> AppResult<Appointment> {
        self.store
            .query_by_id(id)
            .await
            .map_err(|e| map_not_found(e, appointment_not_found(id)))
    }

    pub async fn query_by_user_id(
        &self,
        user_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<Appointment>> {
        Ok(self.store.query_by_user_id(user_id, order, page).await?)
    }

    pub async fn query_by_business_id(
        &self,
        business_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<Appointment>> {
        Ok(self.store.query_by_business_id(business_id, order, page).await?)
    }
}

fn appointment_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("appointment {id} not found"))
}
