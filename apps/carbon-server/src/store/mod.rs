//! Persistence boundary for the facility inventory and its usage records.
//!
//! Handlers and the emissions engine only talk to [`Store`]; the process picks
//! a backend at startup and shares it through `AppState`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type Id = i64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidReference(String),
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Join views the aggregation endpoints read from. All of them expose the
/// [`EmissionRow`] shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionSource {
    Campus,
    Building,
    Device,
}

impl EmissionSource {
    pub fn view_name(self) -> &'static str {
        match self {
            Self::Campus => "emissions_view",
            Self::Building => "building_emissions_view",
            Self::Device => "device_emissions_view",
        }
    }
}

/// Predicates pushed down to the store. `None` omits the predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Case-insensitive exact match on `campus_name`.
    pub campus: Option<String>,
    /// Equality on `year`.
    pub year: Option<i32>,
}

/// Inclusive row window `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub from: i64,
    pub to: i64,
}

impl PageRange {
    pub fn for_page(page: i64, size: i64) -> Self {
        let from = page * size;
        Self {
            from,
            to: from + size - 1,
        }
    }

    pub fn len(&self) -> i64 {
        self.to - self.from + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema,
)]
pub struct EmissionRow {
    #[schema(value_type = Option<i64>)]
    pub usage_id: Option<Id>,
    pub campus_name: Option<String>,
    pub building_name: Option<String>,
    pub room_name: Option<String>,
    pub device_name: Option<String>,
    pub device_power: Option<f64>,
    pub usage_hours: Option<f64>,
    pub year: Option<i32>,
    pub month: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Campus {
    #[schema(value_type = i64)]
    pub campus_id: Id,
    pub campus_name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Building {
    #[schema(value_type = i64)]
    pub building_id: Id,
    pub building_name: String,
    #[schema(value_type = i64)]
    pub campus_id: Id,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Room {
    #[schema(value_type = i64)]
    pub room_id: Id,
    pub room_name: String,
    #[schema(value_type = i64)]
    pub building_id: Id,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Device {
    #[schema(value_type = i64)]
    pub device_id: Id,
    pub device_name: String,
    pub device_power: f64,
    #[schema(value_type = i64)]
    pub room_id: Id,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub device_name: String,
    pub device_power: f64,
    pub room_id: Id,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct UsageRecord {
    #[schema(value_type = i64)]
    pub usage_id: Id,
    #[schema(value_type = i64)]
    pub device_id: Id,
    pub usage_hours: f64,
    pub year: i32,
    pub month: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUsage {
    pub device_id: Id,
    pub usage_hours: f64,
    pub year: i32,
    pub month: i32,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// One window of a join view, ordered by `usage_id`.
    async fn fetch_emission_page(
        &self,
        source: EmissionSource,
        filter: &RowFilter,
        range: PageRange,
    ) -> StoreResult<Vec<EmissionRow>>;

    async fn list_campuses(&self) -> StoreResult<Vec<Campus>>;
    async fn find_campus(&self, name: &str) -> StoreResult<Option<Campus>>;
    async fn insert_campus(&self, name: &str) -> StoreResult<Campus>;

    async fn find_building(&self, campus_id: Id, name: &str) -> StoreResult<Option<Building>>;
    /// First building with this name in any campus, lowest id wins.
    async fn find_building_by_name(&self, name: &str) -> StoreResult<Option<Building>>;
    async fn list_buildings(&self, campus_id: Id) -> StoreResult<Vec<Building>>;
    async fn insert_building(&self, campus_id: Id, name: &str) -> StoreResult<Building>;

    async fn find_room(&self, building_id: Id, name: &str) -> StoreResult<Option<Room>>;
    async fn list_rooms(&self, building_id: Id) -> StoreResult<Vec<Room>>;
    async fn insert_room(&self, building_id: Id, name: &str) -> StoreResult<Room>;

    async fn get_device(&self, device_id: Id) -> StoreResult<Option<Device>>;
    async fn list_devices(&self, room_id: Id) -> StoreResult<Vec<Device>>;
    async fn insert_device(&self, device: &NewDevice) -> StoreResult<Device>;
    async fn update_device(&self, device_id: Id, device: &NewDevice)
        -> StoreResult<Option<Device>>;
    /// Removes the device and its usage records. Returns `false` when absent.
    async fn delete_device(&self, device_id: Id) -> StoreResult<bool>;

    async fn get_usage(&self, usage_id: Id) -> StoreResult<Option<UsageRecord>>;
    async fn find_usage(
        &self,
        device_id: Id,
        year: i32,
        month: i32,
    ) -> StoreResult<Option<UsageRecord>>;
    /// Ordered by year, then month.
    async fn list_usages(&self, device_id: Id) -> StoreResult<Vec<UsageRecord>>;
    async fn insert_usage(&self, usage: &NewUsage) -> StoreResult<UsageRecord>;
    async fn update_usage(&self, usage_id: Id, usage: &NewUsage)
        -> StoreResult<Option<UsageRecord>>;
    async fn delete_usage(&self, usage_id: Id) -> StoreResult<bool>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;
    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<bool>;
}
