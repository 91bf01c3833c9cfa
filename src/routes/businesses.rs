use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{
    Business, BusinessFilter, NewBusiness, UpdateBusiness, BUSINESS_ORDER_FIELDS,
};
use crate::error::AppResult;
use crate::query::{Direction, ListParams, OrderBy, PageDocument};
use crate::routes::auth::AuthClaims;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;

const DEFAULT_ORDER: OrderBy = OrderBy::new("name", Direction::Asc);

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_businesses).post(create_business))
        .route(
            "/:business_id",
            get(get_business)
                .put(update_business)
                .delete(delete_business),
        )
}

async fn create_business(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiJson(new): ApiJson<NewBusiness>,
) -> AppResult<Json<Business>> {
    let business = state.businesses.create(&claims, new, Utc::now()).await?;
    Ok(Json(business))
}

async fn list_businesses(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<BusinessFilter>,
) -> AppResult<Json<PageDocument<Business>>> {
    let (order, page) = params.resolve(BUSINESS_ORDER_FIELDS, DEFAULT_ORDER)?;
    let items = state.businesses.query(&filter, order, page).await?;
    let total = state.businesses.count(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

async fn get_business(
    State(state): State<Arc<AppState>>,
    AuthClaims(_claims): AuthClaims,
    ApiPath(business_id): ApiPath<Uuid>,
) -> AppResult<Json<Business>> {
    Ok(Json(state.businesses.query_by_id(business_id).await?))
}

async fn update_business(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(business_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<UpdateBusiness>,
) -> AppResult<Json<Business>> {
    let existing = state.businesses.query_by_id(business_id).await?;
    let business = state
        .businesses
        .update(&claims, existing, patch, Utc::now())
        .await?;
    Ok(Json(business))
}

async fn delete_business(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(business_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let existing = state.businesses.query_by_id(business_id).await?;
    state.businesses.delete(&claims, &existing).await?;
    Ok(StatusCode::NO_CONTENT)
}
