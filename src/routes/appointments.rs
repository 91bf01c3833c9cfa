use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{
    Appointment, AppointmentFilter, AppointmentPatch, NewAppointment, APPOINTMENT_ORDER_FIELDS,
};
use crate::db::Tx;
use crate::error::{AppError, AppResult};
use crate::query::{Direction, ListParams, OrderBy, PageDocument};
use crate::routes::auth::AuthClaims;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::services::policy::{authorize, Rule};
use crate::AppState;

const DEFAULT_ORDER: OrderBy = OrderBy::new("scheduled_on", Direction::Asc);

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route(
            "/:appointment_id",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/users/:user_id", get(list_for_user))
        .route("/businesses/:business_id", get(list_for_business))
}

/// Books a slot. The reminder is queued only after the booking commits.
async fn create_appointment(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiJson(new): ApiJson<NewAppointment>,
) -> AppResult<Json<Appointment>> {
    authorize(&claims, Some(new.user_id), Rule::AdminOrSubject)?;

    let tx = Tx::begin(&state.db).await?;
    let (appointment, event) = state
        .appointments
        .with_transaction(&tx)
        .create(new, Utc::now())
        .await?;
    tx.commit().await?;

    state.reminders.publish(&event).await;
    Ok(Json(appointment))
}

async fn list_appointments(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<AppointmentFilter>,
) -> AppResult<Json<PageDocument<Appointment>>> {
    authorize(&claims, None, Rule::AdminOnly)?;
    let (order, page) = params.resolve(APPOINTMENT_ORDER_FIELDS, DEFAULT_ORDER)?;

    let items = state.appointments.query(&filter, order, page).await?;
    let total = state.appointments.count(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

async fn get_appointment(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(appointment_id): ApiPath<Uuid>,
) -> AppResult<Json<Appointment>> {
    let appointment = state.appointments.query_by_id(appointment_id).await?;
    authorize(&claims, Some(appointment.user_id), Rule::AdminOrSubject)?;
    Ok(Json(appointment))
}

async fn update_appointment(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(appointment_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<AppointmentPatch>,
) -> AppResult<Json<Appointment>> {
    let tx = Tx::begin(&state.db).await?;
    let appointments = state.appointments.with_transaction(&tx);

    let existing = appointments.query_by_id(appointment_id).await?;
    authorize(&claims, Some(existing.user_id), Rule::AdminOrSubject)?;
    let (appointment, event) = appointments.update(existing, patch, Utc::now()).await?;
    tx.commit().await?;

    if let Some(event) = event {
        state.reminders.publish(&event).await;
    }
    Ok(Json(appointment))
}

async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(appointment_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let tx = Tx::begin(&state.db).await?;
    let appointments = state.appointments.with_transaction(&tx);

    let existing = appointments.query_by_id(appointment_id).await?;
    authorize(&claims, Some(existing.user_id), Rule::AdminOrSubject)?;
    let event = appointments.delete(&existing).await?;
    tx.commit().await?;

    state.reminders.publish(&event).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_for_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> AppResult<Json<PageDocument<Appointment>>> {
    authorize(&claims, Some(user_id), Rule::AdminOrSubject)?;
    let (order, page) = params.resolve(APPOINTMENT_ORDER_FIELDS, DEFAULT_ORDER)?;

    let items = state
        .appointments
        .query_by_user_id(user_id, order, page)
        .await?;
    let filter = AppointmentFilter {
        user_id: Some(user_id),
        ..Default::default()
    };
    let total = state.appointments.count(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

/// Bookings of a business, visible to its owner and to admins.
async fn list_for_business(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(business_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> AppResult<Json<PageDocument<Appointment>>> {
    let business = state.businesses.query_by_id(business_id).await?;
    if !claims.is_admin() && business.owner_id != claims.sub {
        return Err(AppError::PermissionDenied);
    }
    let (order, page) = params.resolve(APPOINTMENT_ORDER_FIELDS, DEFAULT_ORDER)?;

    let items = state
        .appointments
        .query_by_business_id(business_id, order, page)
        .await?;
    let filter = AppointmentFilter {
        business_id: Some(business_id),
        ..Default::default()
    };
    let total = state.appointments.count(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}
