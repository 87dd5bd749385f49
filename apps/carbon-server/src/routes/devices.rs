use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::input::{parse_path_id, DeviceRequest, JsonBody};
use crate::services::lookup;
use crate::state::AppState;
use crate::store::{Device, Id, NewDevice};

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct DeviceListQuery {
    building_name: Option<String>,
    room_name: Option<String>,
    /// Disambiguates buildings that share a name across campuses.
    campus_name: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceSummary {
    #[schema(value_type = i64)]
    device_id: Id,
    device_name: String,
    device_power: f64,
}

impl From<Device> for DeviceSummary {
    fn from(device: Device) -> Self {
        Self {
            device_id: device.device_id,
            device_name: device.device_name,
            device_power: device.device_power,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceListResponse {
    building_name: String,
    room_name: String,
    devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceResponse {
    message: String,
    device: Device,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceDeletedResponse {
    message: String,
    #[schema(value_type = i64)]
    deleted_device_id: Id,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    params(DeviceListQuery),
    responses(
        (status = 200, description = "Devices in the room", body = DeviceListResponse),
        (status = 400, description = "building_name or room_name missing"),
        (status = 404, description = "Campus, building or room not found")
    )
)]
pub(crate) async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
) -> AppResult<Json<DeviceListResponse>> {
    let (Some(building_name), Some(room_name)) =
        (non_blank(query.building_name), non_blank(query.room_name))
    else {
        return Err(AppError::bad_request(
            "building_name and room_name are required.",
        ));
    };
    let store = state.store.as_ref();

    let building = match non_blank(query.campus_name) {
        Some(campus_name) => {
            let campus = lookup::resolve_campus(store, &campus_name).await?;
            lookup::resolve_building(store, campus.campus_id, &building_name).await?
        }
        None => lookup::resolve_building_any_campus(store, &building_name).await?,
    };
    let room = lookup::resolve_room(store, building.building_id, &room_name).await?;
    let devices = store.list_devices(room.room_id).await?;

    Ok(Json(DeviceListResponse {
        building_name: building.building_name,
        room_name: room.room_name,
        devices: devices.into_iter().map(DeviceSummary::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/devices",
    tag = "devices",
    request_body = DeviceRequest,
    responses(
        (status = 201, description = "Device created", body = DeviceResponse),
        (status = 400, description = "Missing or invalid fields, or unknown room"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn create_device(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    JsonBody(payload): JsonBody<DeviceRequest>,
) -> AppResult<(StatusCode, Json<DeviceResponse>)> {
    let device = NewDevice::try_from(payload)?;
    let device = state.store.insert_device(&device).await?;
    tracing::info!(device_id = device.device_id, room_id = device.room_id, "created device");
    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            message: "Device added successfully.".to_string(),
            device,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/devices/{device_id}",
    tag = "devices",
    params(("device_id" = i64, Path, description = "Device id")),
    request_body = DeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn update_device(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(device_id): Path<String>,
    JsonBody(payload): JsonBody<DeviceRequest>,
) -> AppResult<Json<DeviceResponse>> {
    let device_id = parse_path_id(&device_id, "device_id")?;
    let device = NewDevice::try_from(payload)?;
    let device = state
        .store
        .update_device(device_id, &device)
        .await?
        .ok_or_else(|| AppError::not_found("Device not found."))?;
    Ok(Json(DeviceResponse {
        message: "Device updated successfully.".to_string(),
        device,
    }))
}

#[utoipa::path(
    delete,
    path = "/devices/{device_id}",
    tag = "devices",
    params(("device_id" = i64, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device and its usage records deleted", body = DeviceDeletedResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn delete_device(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(device_id): Path<String>,
) -> AppResult<Json<DeviceDeletedResponse>> {
    let device_id = parse_path_id(&device_id, "device_id")?;
    if !state.store.delete_device(device_id).await? {
        return Err(AppError::not_found("Device not found."));
    }
    tracing::info!(device_id, "deleted device");
    Ok(Json(DeviceDeletedResponse {
        message: "Device deleted successfully.".to_string(),
        deleted_device_id: device_id,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices).post(create_device))
        .route("/devices/{device_id}", put(update_device).delete(delete_device))
}
