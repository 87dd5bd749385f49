use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::input::{
    parse_emission_query, DeviceInputRequest, EmissionQuery, FilterEcho, FullUsageInput,
    JsonBody,
};
use crate::services::emissions::{self, BuildingEmissions, CampusEmissions};
use crate::services::lookup;
use crate::state::AppState;
use crate::store::{Device, EmissionRow, UsageRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct CampusEmissionsResponse {
    filter: FilterEcho,
    #[serde(flatten)]
    report: CampusEmissions,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct BuildingEmissionsResponse {
    filter: FilterEcho,
    /// building name → totals and rooms
    #[schema(value_type = Object)]
    buildings: BTreeMap<String, BuildingEmissions>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceEmissionsResponse {
    filter: FilterEcho,
    /// device name → kg CO2e
    #[schema(value_type = Object)]
    device_emissions: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct RawDeviceDataResponse {
    filter: FilterEcho,
    raw_device_data: Vec<EmissionRow>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DeviceInputResponse {
    message: String,
    device: Device,
    usage: UsageRecord,
}

#[utoipa::path(
    get,
    path = "/emissions/campus",
    tag = "emissions",
    params(EmissionQuery),
    responses(
        (status = 200, description = "Emissions per campus, bucketed by year or month", body = CampusEmissionsResponse),
        (status = 400, description = "Invalid year"),
        (status = 500, description = "Store failure")
    )
)]
pub(crate) async fn campus_emissions(
    State(state): State<AppState>,
    Query(query): Query<EmissionQuery>,
) -> AppResult<Json<CampusEmissionsResponse>> {
    let filters = parse_emission_query(query)?;
    let report = emissions::campus_report(state.store.as_ref(), &filters).await?;
    Ok(Json(CampusEmissionsResponse {
        filter: filters.echo,
        report,
    }))
}

#[utoipa::path(
    get,
    path = "/emissions/building",
    tag = "emissions",
    params(EmissionQuery),
    responses(
        (status = 200, description = "Emissions per building with a per-room breakdown", body = BuildingEmissionsResponse),
        (status = 400, description = "Invalid year")
    )
)]
pub(crate) async fn building_emissions(
    State(state): State<AppState>,
    Query(query): Query<EmissionQuery>,
) -> AppResult<Json<BuildingEmissionsResponse>> {
    let filters = parse_emission_query(query)?;
    let buildings = emissions::building_report(state.store.as_ref(), &filters).await?;
    Ok(Json(BuildingEmissionsResponse {
        filter: filters.echo,
        buildings,
    }))
}

#[utoipa::path(
    get,
    path = "/emissions/device",
    tag = "emissions",
    params(EmissionQuery),
    responses(
        (status = 200, description = "Emissions per device name", body = DeviceEmissionsResponse),
        (status = 400, description = "Invalid year")
    )
)]
pub(crate) async fn device_emissions(
    State(state): State<AppState>,
    Query(query): Query<EmissionQuery>,
) -> AppResult<Json<DeviceEmissionsResponse>> {
    let filters = parse_emission_query(query)?;
    let device_emissions = emissions::device_report(state.store.as_ref(), &filters).await?;
    Ok(Json(DeviceEmissionsResponse {
        filter: filters.echo,
        device_emissions,
    }))
}

#[utoipa::path(
    get,
    path = "/emissions/device/raw",
    tag = "emissions",
    params(EmissionQuery),
    responses(
        (status = 200, description = "Unaggregated device usage rows", body = RawDeviceDataResponse),
        (status = 400, description = "Invalid year")
    )
)]
pub(crate) async fn raw_device_data(
    State(state): State<AppState>,
    Query(query): Query<EmissionQuery>,
) -> AppResult<Json<RawDeviceDataResponse>> {
    let filters = parse_emission_query(query)?;
    let raw_device_data = emissions::device_rows(state.store.as_ref(), &filters).await?;
    Ok(Json(RawDeviceDataResponse {
        filter: filters.echo,
        raw_device_data,
    }))
}

#[utoipa::path(
    post,
    path = "/emissions/device_input",
    tag = "emissions",
    request_body = DeviceInputRequest,
    responses(
        (status = 201, description = "Device and usage recorded", body = DeviceInputResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Duplicate record")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn device_input(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(payload): JsonBody<DeviceInputRequest>,
) -> AppResult<(StatusCode, Json<DeviceInputResponse>)> {
    let input = FullUsageInput::try_from(payload)?;
    let (device, usage) = lookup::register_device_usage(state.store.as_ref(), &input).await?;
    tracing::info!(user = %user.email, device_id = device.device_id, "device input recorded");
    Ok((
        StatusCode::CREATED,
        Json(DeviceInputResponse {
            message: "Device and usage data added successfully.".to_string(),
            device,
            usage,
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/emissions/campus", get(campus_emissions))
        .route("/emissions/building", get(building_emissions))
        .route("/emissions/device", get(device_emissions))
        .route("/emissions/device/raw", get(raw_device_data))
        .route("/emissions/device_input", post(device_input))
}
