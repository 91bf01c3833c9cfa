use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::Tx;
use crate::error::AppResult;
use crate::query::{Direction, ListParams, OrderBy, PageDocument};
use crate::routes::auth::AuthClaims;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::services::policy::{authorize, Rule};
use crate::AppState;

const GENERAL_DEFAULT_ORDER: OrderBy = OrderBy::new("date_created", Direction::Asc);
const DAILY_DEFAULT_ORDER: OrderBy = OrderBy::new("applicable_date", Direction::Asc);

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/general", get(list_general).post(create_general))
        .route(
            "/general/:agenda_id",
            get(get_general).put(update_general).delete(delete_general),
        )
        .route("/daily", get(list_daily).post(create_daily))
        .route(
            "/daily/:agenda_id",
            get(get_daily).put(update_daily).delete(delete_daily),
        )
        .route("/slots", get(list_slots))
}

// ============================================================================
// General agendas
// ============================================================================

async fn create_general(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiJson(new): ApiJson<NewGeneralAgenda>,
) -> AppResult<Json<GeneralAgendaDocument>> {
    let tx = Tx::begin(&state.db).await?;
    let agenda = state
        .agendas
        .with_transaction(&tx)
        .create_general(&claims, new, Utc::now())
        .await?;
    tx.commit().await?;
    Ok(Json(agenda.into()))
}

async fn list_general(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<GeneralAgendaFilter>,
) -> AppResult<Json<PageDocument<GeneralAgendaDocument>>> {
    authorize(&claims, None, Rule::AdminOnly)?;
    let (order, page) = params.resolve(GENERAL_AGENDA_ORDER_FIELDS, GENERAL_DEFAULT_ORDER)?;

    let items = state.agendas.query_general(&filter, order, page).await?;
    let total = state.agendas.count_general(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

async fn get_general(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
) -> AppResult<Json<GeneralAgendaDocument>> {
    let agenda = state.agendas.query_general_by_id(agenda_id).await?;
    Ok(Json(agenda.into()))
}

async fn update_general(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<GeneralAgendaPatch>,
) -> AppResult<Json<GeneralAgendaDocument>> {
    let tx = Tx::begin(&state.db).await?;
    let agendas = state.agendas.with_transaction(&tx);
    let existing = agendas.query_general_by_id(agenda_id).await?;
    let agenda = agendas
        .update_general(&claims, existing, patch, Utc::now())
        .await?;
    tx.commit().await?;
    Ok(Json(agenda.into()))
}

async fn delete_general(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let tx = Tx::begin(&state.db).await?;
    let agendas = state.agendas.with_transaction(&tx);
    let existing = agendas.query_general_by_id(agenda_id).await?;
    agendas.delete_general(&claims, &existing).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Daily agendas
// ============================================================================

async fn create_daily(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiJson(new): ApiJson<NewDailyAgenda>,
) -> AppResult<Json<DailyAgendaDocument>> {
    let tx = Tx::begin(&state.db).await?;
    let agenda = state
        .agendas
        .with_transaction(&tx)
        .create_daily(&claims, new, Utc::now())
        .await?;
    tx.commit().await?;
    Ok(Json(agenda.into()))
}

async fn list_daily(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<DailyAgendaFilter>,
) -> AppResult<Json<PageDocument<DailyAgendaDocument>>> {
    authorize(&claims, None, Rule::AdminOnly)?;
    let (order, page) = params.resolve(DAILY_AGENDA_ORDER_FIELDS, DAILY_DEFAULT_ORDER)?;
    let today = Utc::now().date_naive();

    let items = state.agendas.query_daily(&filter, today, order, page).await?;
    let total = state.agendas.count_daily(&filter, today).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

async fn get_daily(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
) -> AppResult<Json<DailyAgendaDocument>> {
    let agenda = state.agendas.query_daily_by_id(agenda_id).await?;
    Ok(Json(agenda.into()))
}

async fn update_daily(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<DailyAgendaPatch>,
) -> AppResult<Json<DailyAgendaDocument>> {
    let tx = Tx::begin(&state.db).await?;
    let agendas = state.agendas.with_transaction(&tx);
    let existing = agendas.query_daily_by_id(agenda_id).await?;
    let agenda = agendas
        .update_daily(&claims, existing, patch, Utc::now())
        .await?;
    tx.commit().await?;
    Ok(Json(agenda.into()))
}

async fn delete_daily(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(agenda_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let tx = Tx::begin(&state.db).await?;
    let agendas = state.agendas.with_transaction(&tx);
    let existing = agendas.query_daily_by_id(agenda_id).await?;
    agendas.delete_daily(&claims, &existing).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub business_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub business_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<DateTime<Utc>>,
}

/// Bookable instants of a business on one of its local dates.
async fn list_slots(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    ApiQuery(query): ApiQuery<SlotsQuery>,
) -> AppResult<Json<SlotsResponse>> {
    let slots = state
        .agendas
        .slots_for_date(query.business_id, query.date)
        .await?;
    Ok(Json(SlotsResponse {
        business_id: query.business_id,
        date: query.date,
        slots,
    }))
}
