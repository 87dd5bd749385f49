//! Dropdown sources for the campus → building → room pickers.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::state::AppState;
use crate::store::Id;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct CampusName {
    campus_name: String,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct CampusListResponse {
    campuses: Vec<CampusName>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct BuildingListQuery {
    campus_name: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct BuildingListResponse {
    buildings: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct RoomListQuery {
    building_name: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct RoomEntry {
    #[schema(value_type = i64)]
    room_id: Id,
    room_name: String,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct RoomListResponse {
    rooms: Vec<RoomEntry>,
}

#[utoipa::path(
    get,
    path = "/campuses",
    tag = "directory",
    responses((status = 200, description = "Campuses sorted by name", body = CampusListResponse))
)]
pub(crate) async fn list_campuses(
    State(state): State<AppState>,
) -> AppResult<Json<CampusListResponse>> {
    let campuses = state
        .store
        .list_campuses()
        .await?
        .into_iter()
        .map(|campus| CampusName {
            campus_name: campus.campus_name,
        })
        .collect();
    Ok(Json(CampusListResponse { campuses }))
}

#[utoipa::path(
    get,
    path = "/buildings",
    tag = "directory",
    params(BuildingListQuery),
    responses((status = 200, description = "Building names of the campus, sorted; empty for an unknown campus", body = BuildingListResponse))
)]
pub(crate) async fn list_buildings(
    State(state): State<AppState>,
    Query(query): Query<BuildingListQuery>,
) -> AppResult<Json<BuildingListResponse>> {
    let Some(campus_name) = query.campus_name.filter(|name| !name.trim().is_empty()) else {
        return Ok(Json(BuildingListResponse { buildings: vec![] }));
    };
    let Some(campus) = state.store.find_campus(campus_name.trim()).await? else {
        return Ok(Json(BuildingListResponse { buildings: vec![] }));
    };
    let buildings = state
        .store
        .list_buildings(campus.campus_id)
        .await?
        .into_iter()
        .map(|building| building.building_name)
        .collect();
    Ok(Json(BuildingListResponse { buildings }))
}

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "directory",
    params(RoomListQuery),
    responses((status = 200, description = "Rooms of the building, sorted by name; empty for an unknown building", body = RoomListResponse))
)]
pub(crate) async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomListQuery>,
) -> AppResult<Json<RoomListResponse>> {
    let Some(building_name) = query.building_name.filter(|name| !name.trim().is_empty()) else {
        return Ok(Json(RoomListResponse { rooms: vec![] }));
    };
    let Some(building) = state
        .store
        .find_building_by_name(building_name.trim())
        .await?
    else {
        return Ok(Json(RoomListResponse { rooms: vec![] }));
    };
    let rooms = state
        .store
        .list_rooms(building.building_id)
        .await?
        .into_iter()
        .map(|room| RoomEntry {
            room_id: room.room_id,
            room_name: room.room_name,
        })
        .collect();
    Ok(Json(RoomListResponse { rooms }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campuses", get(list_campuses))
        .route("/buildings", get(list_buildings))
        .route("/rooms", get(list_rooms))
}
