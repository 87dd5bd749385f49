use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::input::{parse_path_id, JsonBody, UsageRequest};
use crate::state::AppState;
use crate::store::{Id, NewUsage, Store, UsageRecord};

const DUPLICATE_USAGE: &str = "Usage record already exists for this device, year and month.";

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct UsageListQuery {
    device_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct UsageListResponse {
    #[schema(value_type = i64)]
    device_id: Id,
    usage_records: Vec<UsageRecord>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct UsageResponse {
    message: String,
    usage: UsageRecord,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct UsageDeletedResponse {
    message: String,
    #[schema(value_type = i64)]
    deleted_usage_id: Id,
}

/// Rejects a record that would share (device, year, month) with another one.
async fn ensure_slot_free(store: &dyn Store, usage: &NewUsage, except: Option<Id>) -> AppResult<()> {
    let existing = store
        .find_usage(usage.device_id, usage.year, usage.month)
        .await?;
    match existing {
        Some(found) if Some(found.usage_id) != except => Err(AppError::conflict(DUPLICATE_USAGE)),
        _ => Ok(()),
    }
}

async fn ensure_device(store: &dyn Store, device_id: Id) -> AppResult<()> {
    store
        .get_device(device_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Device not found."))
}

#[utoipa::path(
    get,
    path = "/device-usages",
    tag = "device-usages",
    params(UsageListQuery),
    responses(
        (status = 200, description = "Usage records ordered by year and month", body = UsageListResponse),
        (status = 400, description = "device_id missing or invalid")
    )
)]
pub(crate) async fn list_usages(
    State(state): State<AppState>,
    Query(query): Query<UsageListQuery>,
) -> AppResult<Json<UsageListResponse>> {
    let raw = query
        .device_id
        .ok_or_else(|| AppError::bad_request("device_id is required."))?;
    let device_id = parse_path_id(&raw, "device_id")?;
    let usage_records = state.store.list_usages(device_id).await?;
    Ok(Json(UsageListResponse {
        device_id,
        usage_records,
    }))
}

#[utoipa::path(
    post,
    path = "/device-usages",
    tag = "device-usages",
    request_body = UsageRequest,
    responses(
        (status = 201, description = "Usage record created", body = UsageResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Record exists for this device and month")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn create_usage(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    JsonBody(payload): JsonBody<UsageRequest>,
) -> AppResult<(StatusCode, Json<UsageResponse>)> {
    let usage = payload.into_new_usage()?;
    let store = state.store.as_ref();
    ensure_device(store, usage.device_id).await?;
    ensure_slot_free(store, &usage, None).await?;

    let usage = store.insert_usage(&usage).await?;
    tracing::info!(
        usage_id = usage.usage_id,
        device_id = usage.device_id,
        year = usage.year,
        month = usage.month,
        "created usage record"
    );
    Ok((
        StatusCode::CREATED,
        Json(UsageResponse {
            message: "Usage record added successfully.".to_string(),
            usage,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/device-usages",
    tag = "device-usages",
    request_body = UsageRequest,
    responses(
        (status = 200, description = "Usage record updated", body = UsageResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Usage record or device not found"),
        (status = 409, description = "Another record exists for this device and month")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn update_usage(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    JsonBody(payload): JsonBody<UsageRequest>,
) -> AppResult<Json<UsageResponse>> {
    let (usage_id, usage) = payload.into_update()?;
    let store = state.store.as_ref();
    if store.get_usage(usage_id).await?.is_none() {
        return Err(AppError::not_found("Usage record not found."));
    }
    ensure_device(store, usage.device_id).await?;
    ensure_slot_free(store, &usage, Some(usage_id)).await?;

    let usage = store
        .update_usage(usage_id, &usage)
        .await?
        .ok_or_else(|| AppError::not_found("Usage record not found."))?;
    Ok(Json(UsageResponse {
        message: "Usage record updated successfully.".to_string(),
        usage,
    }))
}

#[utoipa::path(
    delete,
    path = "/device-usages",
    tag = "device-usages",
    request_body = UsageRequest,
    responses(
        (status = 200, description = "Usage record deleted", body = UsageDeletedResponse),
        (status = 400, description = "usage_id missing"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Usage record not found")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn delete_usage(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    JsonBody(payload): JsonBody<UsageRequest>,
) -> AppResult<Json<UsageDeletedResponse>> {
    let usage_id = payload.into_usage_id()?;
    if !state.store.delete_usage(usage_id).await? {
        return Err(AppError::not_found("Usage record not found."));
    }
    tracing::info!(usage_id, "deleted usage record");
    Ok(Json(UsageDeletedResponse {
        message: "Usage record deleted successfully.".to_string(),
        deleted_usage_id: usage_id,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/device-usages",
        get(list_usages)
            .post(create_usage)
            .put(update_usage)
            .delete(delete_usage),
    )
}
