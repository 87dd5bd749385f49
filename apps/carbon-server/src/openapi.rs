use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{devices, directory, emissions, health, usages, users};
use crate::state::AppState;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "HTTPBearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Carbon Server", description = "Campus device usage and CO2e emissions"),
    paths(
        health::healthz_handler,
        emissions::campus_emissions,
        emissions::building_emissions,
        emissions::device_emissions,
        emissions::raw_device_data,
        emissions::device_input,
        devices::list_devices,
        devices::create_device,
        devices::update_device,
        devices::delete_device,
        usages::list_usages,
        usages::create_usage,
        usages::update_usage,
        usages::delete_usage,
        directory::list_campuses,
        directory::list_buildings,
        directory::list_rooms,
        users::register,
        users::login,
        users::forgot_password,
        users::reset_password,
    ),
    components(schemas(
        health::HealthResponse,
        crate::input::FilterEcho,
        crate::input::DeviceInputRequest,
        crate::input::DeviceRequest,
        crate::input::UsageRequest,
        crate::store::EmissionRow,
        crate::store::Device,
        crate::store::UsageRecord,
        crate::services::emissions::CampusEmissions,
        crate::services::emissions::BuildingEmissions,
        emissions::CampusEmissionsResponse,
        emissions::BuildingEmissionsResponse,
        emissions::DeviceEmissionsResponse,
        emissions::RawDeviceDataResponse,
        emissions::DeviceInputResponse,
        devices::DeviceSummary,
        devices::DeviceListResponse,
        devices::DeviceResponse,
        devices::DeviceDeletedResponse,
        usages::UsageListResponse,
        usages::UsageResponse,
        usages::UsageDeletedResponse,
        directory::CampusName,
        directory::CampusListResponse,
        directory::BuildingListResponse,
        directory::RoomEntry,
        directory::RoomListResponse,
        users::CredentialsRequest,
        users::MessageResponse,
        users::LoginResponse,
        users::ForgotPasswordRequest,
        users::ResetPasswordRequest,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "emissions", description = "Aggregated CO2e reports"),
        (name = "devices", description = "Device inventory"),
        (name = "device-usages", description = "Monthly usage records"),
        (name = "directory", description = "Campus, building and room pickers"),
        (name = "users", description = "Accounts and sessions")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
