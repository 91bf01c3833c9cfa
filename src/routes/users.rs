use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{NewUser, UpdateUser, User, UserFilter, USER_ORDER_FIELDS};
use crate::error::AppResult;
use crate::query::{Direction, ListParams, OrderBy, PageDocument};
use crate::routes::auth::AuthClaims;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::services::policy::{authorize, Rule};
use crate::AppState;

const DEFAULT_ORDER: OrderBy = OrderBy::new("name", Direction::Asc);

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Open registration.
async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(new): ApiJson<NewUser>,
) -> AppResult<Json<User>> {
    let user = state.users.create(new, Utc::now()).await?;
    Ok(Json(user))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> AppResult<Json<PageDocument<User>>> {
    authorize(&claims, None, Rule::AdminOnly)?;
    let (order, page) = params.resolve(USER_ORDER_FIELDS, DEFAULT_ORDER)?;

    let items = state.users.query(&filter, order, page).await?;
    let total = state.users.count(&filter).await?;
    Ok(Json(PageDocument::new(items, total, page)))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<User>> {
    authorize(&claims, Some(user_id), Rule::AdminOrSubject)?;
    Ok(Json(state.users.query_by_id(user_id).await?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<UpdateUser>,
) -> AppResult<Json<User>> {
    authorize(&claims, Some(user_id), Rule::AdminOrSubject)?;
    let existing = state.users.query_by_id(user_id).await?;
    let user = state
        .users
        .update(&claims, existing, patch, Utc::now())
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&claims, Some(user_id), Rule::AdminOrSubject)?;
    state.users.delete(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
