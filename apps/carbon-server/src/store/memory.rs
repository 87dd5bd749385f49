use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Building, Campus, Device, EmissionRow, EmissionSource, Id, NewDevice, NewUsage, PageRange,
    Room, RowFilter, Store, StoreError, StoreResult, UsageRecord, User,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: Id,
    campuses: BTreeMap<Id, Campus>,
    buildings: BTreeMap<Id, Building>,
    rooms: BTreeMap<Id, Room>,
    devices: BTreeMap<Id, Device>,
    usages: BTreeMap<Id, UsageRecord>,
    users: Vec<User>,
    /// Replaces the joined view when set.
    #[cfg(test)]
    emission_rows: Option<Vec<EmissionRow>>,
}

impl Tables {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn joined_rows(&self) -> Vec<EmissionRow> {
        #[cfg(test)]
        if let Some(rows) = &self.emission_rows {
            return rows.clone();
        }
        self.usages
            .values()
            .map(|usage| {
                let device = self.devices.get(&usage.device_id);
                let room = device.and_then(|d| self.rooms.get(&d.room_id));
                let building = room.and_then(|r| self.buildings.get(&r.building_id));
                let campus = building.and_then(|b| self.campuses.get(&b.campus_id));
                EmissionRow {
                    usage_id: Some(usage.usage_id),
                    campus_name: campus.map(|c| c.campus_name.clone()),
                    building_name: building.map(|b| b.building_name.clone()),
                    room_name: room.map(|r| r.room_name.clone()),
                    device_name: device.map(|d| d.device_name.clone()),
                    device_power: device.map(|d| d.device_power),
                    usage_hours: Some(usage.usage_hours),
                    year: Some(usage.year),
                    month: Some(usage.month),
                }
            })
            .collect()
    }

    fn require_room(&self, room_id: Id) -> StoreResult<()> {
        if self.rooms.contains_key(&room_id) {
            Ok(())
        } else {
            Err(StoreError::InvalidReference(format!(
                "Room {room_id} does not exist"
            )))
        }
    }

    /// One record per (device, year, month), ignoring `except`.
    fn require_unique_usage(&self, usage: &NewUsage, except: Option<Id>) -> StoreResult<()> {
        let taken = self.usages.values().any(|u| {
            Some(u.usage_id) != except
                && u.device_id == usage.device_id
                && u.year == usage.year
                && u.month == usage.month
        });
        if taken {
            return Err(StoreError::Conflict(
                "Usage record already exists for this device, year and month.".to_string(),
            ));
        }
        Ok(())
    }

    fn require_device(&self, device_id: Id) -> StoreResult<()> {
        if self.devices.contains_key(&device_id) {
            Ok(())
        } else {
            Err(StoreError::InvalidReference(format!(
                "Device {device_id} does not exist"
            )))
        }
    }
}

fn matches_filter(row: &EmissionRow, filter: &RowFilter) -> bool {
    if let Some(campus) = &filter.campus {
        let Some(name) = row.campus_name.as_deref() else {
            return false;
        };
        if name.to_lowercase() != campus.to_lowercase() {
            return false;
        }
    }
    if let Some(year) = filter.year {
        if row.year != Some(year) {
            return false;
        }
    }
    true
}

/// In-process store used by tests and `--memory-store` runs.
///
/// Every join view reads the same usage → device → room → building → campus
/// outer join, ordered by usage id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    page_requests: AtomicUsize,
    #[cfg(test)]
    fail_page: RwLock<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {

    /// A store whose join views serve exactly `rows`.
    pub fn from_emission_rows(rows: Vec<EmissionRow>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                emission_rows: Some(rows),
                ..Tables::default()
            }),
            ..Self::default()
        }
    }

    /// Number of page fetches served so far.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    /// Make the `page`-th page fetch (zero based, counted from now) fail.
    pub async fn fail_page(&self, page: usize) {
        *self.fail_page.write().await = Some(self.page_requests() + page);
    }

    async fn count_page_request(&self, source: EmissionSource, range: PageRange) -> StoreResult<()> {
        let request = self.page_requests.fetch_add(1, Ordering::SeqCst);
        if *self.fail_page.read().await == Some(request) {
            return Err(StoreError::Backend(format!(
                "injected failure reading {} at rows {}-{}",
                source.view_name(),
                range.from,
                range.to
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_emission_page(
        &self,
        _source: EmissionSource,
        filter: &RowFilter,
        range: PageRange,
    ) -> StoreResult<Vec<EmissionRow>> {
        // Every view is the same join here; the source only labels injected failures.
        #[cfg(test)]
        self.count_page_request(_source, range).await?;

        let tables = self.tables.read().await;
        let mut rows = tables.joined_rows();
        rows.sort_by_key(|row| row.usage_id);
        let from = usize::try_from(range.from.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(range.len().max(0)).unwrap_or(0);
        Ok(rows
            .into_iter()
            .filter(|row| matches_filter(row, filter))
            .skip(from)
            .take(take)
            .collect())
    }

    async fn list_campuses(&self) -> StoreResult<Vec<Campus>> {
        let tables = self.tables.read().await;
        let mut campuses: Vec<Campus> = tables.campuses.values().cloned().collect();
        campuses.sort_by(|a, b| a.campus_name.cmp(&b.campus_name));
        Ok(campuses)
    }

    async fn find_campus(&self, name: &str) -> StoreResult<Option<Campus>> {
        let tables = self.tables.read().await;
        Ok(tables
            .campuses
            .values()
            .find(|campus| campus.campus_name == name)
            .cloned())
    }

    async fn insert_campus(&self, name: &str) -> StoreResult<Campus> {
        let mut tables = self.tables.write().await;
        if tables.campuses.values().any(|c| c.campus_name == name) {
            return Err(StoreError::Conflict(format!(
                "Campus \"{name}\" already exists"
            )));
        }
        let campus = Campus {
            campus_id: tables.allocate_id(),
            campus_name: name.to_string(),
        };
        tables.campuses.insert(campus.campus_id, campus.clone());
        Ok(campus)
    }

    async fn find_building(&self, campus_id: Id, name: &str) -> StoreResult<Option<Building>> {
        let tables = self.tables.read().await;
        Ok(tables
            .buildings
            .values()
            .find(|b| b.campus_id == campus_id && b.building_name == name)
            .cloned())
    }

    async fn find_building_by_name(&self, name: &str) -> StoreResult<Option<Building>> {
        let tables = self.tables.read().await;
        Ok(tables
            .buildings
            .values()
            .find(|b| b.building_name == name)
            .cloned())
    }

    async fn list_buildings(&self, campus_id: Id) -> StoreResult<Vec<Building>> {
        let tables = self.tables.read().await;
        let mut buildings: Vec<Building> = tables
            .buildings
            .values()
            .filter(|b| b.campus_id == campus_id)
            .cloned()
            .collect();
        buildings.sort_by(|a, b| a.building_name.cmp(&b.building_name));
        Ok(buildings)
    }

    async fn insert_building(&self, campus_id: Id, name: &str) -> StoreResult<Building> {
        let mut tables = self.tables.write().await;
        if !tables.campuses.contains_key(&campus_id) {
            return Err(StoreError::InvalidReference(format!(
                "Campus {campus_id} does not exist"
            )));
        }
        let building = Building {
            building_id: tables.allocate_id(),
            building_name: name.to_string(),
            campus_id,
        };
        tables
            .buildings
            .insert(building.building_id, building.clone());
        Ok(building)
    }

    async fn find_room(&self, building_id: Id, name: &str) -> StoreResult<Option<Room>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rooms
            .values()
            .find(|r| r.building_id == building_id && r.room_name == name)
            .cloned())
    }

    async fn list_rooms(&self, building_id: Id) -> StoreResult<Vec<Room>> {
        let tables = self.tables.read().await;
        let mut rooms: Vec<Room> = tables
            .rooms
            .values()
            .filter(|r| r.building_id == building_id)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.room_name.cmp(&b.room_name));
        Ok(rooms)
    }

    async fn insert_room(&self, building_id: Id, name: &str) -> StoreResult<Room> {
        let mut tables = self.tables.write().await;
        if !tables.buildings.contains_key(&building_id) {
            return Err(StoreError::InvalidReference(format!(
                "Building {building_id} does not exist"
            )));
        }
        let room = Room {
            room_id: tables.allocate_id(),
            room_name: name.to_string(),
            building_id,
        };
        tables.rooms.insert(room.room_id, room.clone());
        Ok(room)
    }

    async fn get_device(&self, device_id: Id) -> StoreResult<Option<Device>> {
        let tables = self.tables.read().await;
        Ok(tables.devices.get(&device_id).cloned())
    }

    async fn list_devices(&self, room_id: Id) -> StoreResult<Vec<Device>> {
        let tables = self.tables.read().await;
        Ok(tables
            .devices
            .values()
            .filter(|d| d.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn insert_device(&self, device: &NewDevice) -> StoreResult<Device> {
        let mut tables = self.tables.write().await;
        tables.require_room(device.room_id)?;
        let row = Device {
            device_id: tables.allocate_id(),
            device_name: device.device_name.clone(),
            device_power: device.device_power,
            room_id: device.room_id,
        };
        tables.devices.insert(row.device_id, row.clone());
        Ok(row)
    }

    async fn update_device(
        &self,
        device_id: Id,
        device: &NewDevice,
    ) -> StoreResult<Option<Device>> {
        let mut tables = self.tables.write().await;
        if !tables.devices.contains_key(&device_id) {
            return Ok(None);
        }
        tables.require_room(device.room_id)?;
        let row = Device {
            device_id,
            device_name: device.device_name.clone(),
            device_power: device.device_power,
            room_id: device.room_id,
        };
        tables.devices.insert(device_id, row.clone());
        Ok(Some(row))
    }

    async fn delete_device(&self, device_id: Id) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.devices.remove(&device_id).is_none() {
            return Ok(false);
        }
        tables.usages.retain(|_, usage| usage.device_id != device_id);
        Ok(true)
    }

    async fn get_usage(&self, usage_id: Id) -> StoreResult<Option<UsageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.usages.get(&usage_id).cloned())
    }

    async fn find_usage(
        &self,
        device_id: Id,
        year: i32,
        month: i32,
    ) -> StoreResult<Option<UsageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usages
            .values()
            .find(|u| u.device_id == device_id && u.year == year && u.month == month)
            .cloned())
    }

    async fn list_usages(&self, device_id: Id) -> StoreResult<Vec<UsageRecord>> {
        let tables = self.tables.read().await;
        let mut usages: Vec<UsageRecord> = tables
            .usages
            .values()
            .filter(|u| u.device_id == device_id)
            .cloned()
            .collect();
        usages.sort_by_key(|u| (u.year, u.month));
        Ok(usages)
    }

    async fn insert_usage(&self, usage: &NewUsage) -> StoreResult<UsageRecord> {
        let mut tables = self.tables.write().await;
        tables.require_device(usage.device_id)?;
        tables.require_unique_usage(usage, None)?;
        let row = UsageRecord {
            usage_id: tables.allocate_id(),
            device_id: usage.device_id,
            usage_hours: usage.usage_hours,
            year: usage.year,
            month: usage.month,
        };
        tables.usages.insert(row.usage_id, row.clone());
        Ok(row)
    }

    async fn update_usage(
        &self,
        usage_id: Id,
        usage: &NewUsage,
    ) -> StoreResult<Option<UsageRecord>> {
        let mut tables = self.tables.write().await;
        if !tables.usages.contains_key(&usage_id) {
            return Ok(None);
        }
        tables.require_device(usage.device_id)?;
        tables.require_unique_usage(usage, Some(usage_id))?;
        let row = UsageRecord {
            usage_id,
            device_id: usage.device_id,
            usage_hours: usage.usage_hours,
            year: usage.year,
            month: usage.month,
        };
        tables.usages.insert(usage_id, row.clone());
        Ok(Some(row))
    }

    async fn delete_usage(&self, usage_id: Id) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.usages.remove(&usage_id).is_some())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict("Email already in use".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
