//! Name → id resolution for the campus → building → room hierarchy.
//!
//! Each step filters on the id resolved by the previous one, so callers must
//! walk the chain in order.

use crate::error::AppError;
use crate::input::FullUsageInput;
use crate::store::{
    Building, Campus, Device, Id, NewDevice, NewUsage, Room, Store, StoreError, UsageRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(message) => AppError::not_found(message),
            LookupError::Store(err) => err.into(),
        }
    }
}

pub type LookupResult<T> = Result<T, LookupError>;

pub async fn resolve_campus(store: &dyn Store, name: &str) -> LookupResult<Campus> {
    store
        .find_campus(name)
        .await?
        .ok_or_else(|| LookupError::NotFound("Campus not found.".to_string()))
}

pub async fn resolve_building(
    store: &dyn Store,
    campus_id: Id,
    name: &str,
) -> LookupResult<Building> {
    store
        .find_building(campus_id, name)
        .await?
        .ok_or_else(|| LookupError::NotFound("Building not found.".to_string()))
}

/// Building lookup for callers that only know the building name.
pub async fn resolve_building_any_campus(store: &dyn Store, name: &str) -> LookupResult<Building> {
    store
        .find_building_by_name(name)
        .await?
        .ok_or_else(|| LookupError::NotFound("Building not found.".to_string()))
}

pub async fn resolve_room(store: &dyn Store, building_id: Id, name: &str) -> LookupResult<Room> {
    store
        .find_room(building_id, name)
        .await?
        .ok_or_else(|| {
            LookupError::NotFound("Room not found in the specified building.".to_string())
        })
}

async fn ensure_campus(store: &dyn Store, name: &str) -> Result<Campus, StoreError> {
    if let Some(campus) = store.find_campus(name).await? {
        return Ok(campus);
    }
    let campus = store.insert_campus(name).await?;
    tracing::info!(campus_id = campus.campus_id, name, "created campus");
    Ok(campus)
}

async fn ensure_building(
    store: &dyn Store,
    campus_id: Id,
    name: &str,
) -> Result<Building, StoreError> {
    if let Some(building) = store.find_building(campus_id, name).await? {
        return Ok(building);
    }
    let building = store.insert_building(campus_id, name).await?;
    tracing::info!(
        building_id = building.building_id,
        campus_id,
        name,
        "created building"
    );
    Ok(building)
}

async fn ensure_room(store: &dyn Store, building_id: Id, name: &str) -> Result<Room, StoreError> {
    if let Some(room) = store.find_room(building_id, name).await? {
        return Ok(room);
    }
    let room = store.insert_room(building_id, name).await?;
    tracing::info!(room_id = room.room_id, building_id, name, "created room");
    Ok(room)
}

/// Campus, building and room for a placement, creating whichever is missing.
///
/// Two concurrent calls for the same new name can both insert; only a unique
/// constraint in the store prevents the duplicate.
pub async fn ensure_room_path(
    store: &dyn Store,
    campus_name: &str,
    building_name: &str,
    room_name: &str,
) -> Result<(Campus, Building, Room), StoreError> {
    let campus = ensure_campus(store, campus_name).await?;
    let building = ensure_building(store, campus.campus_id, building_name).await?;
    let room = ensure_room(store, building.building_id, room_name).await?;
    Ok((campus, building, room))
}

/// Registers a new device in its room (creating the room path on demand)
/// together with its first usage record.
pub async fn register_device_usage(
    store: &dyn Store,
    input: &FullUsageInput,
) -> Result<(Device, UsageRecord), StoreError> {
    let (_, _, room) = ensure_room_path(
        store,
        &input.campus_name,
        &input.building_name,
        &input.room_name,
    )
    .await?;

    let device = store
        .insert_device(&NewDevice {
            device_name: input.device_name.clone(),
            device_power: input.device_power,
            room_id: room.room_id,
        })
        .await?;
    let usage = store
        .insert_usage(&NewUsage {
            device_id: device.device_id,
            usage_hours: input.usage_hours,
            year: input.year,
            month: input.month,
        })
        .await?;
    tracing::info!(
        device_id = device.device_id,
        usage_id = usage.usage_id,
        year = usage.year,
        month = usage.month,
        "registered device usage"
    );
    Ok((device, usage))
}
