use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    Building, Campus, Device, EmissionRow, EmissionSource, Id, NewDevice, NewUsage, PageRange,
    Room, RowFilter, Store, StoreResult, UsageRecord, User,
};

/// PostgreSQL backend.
///
/// `device_usage.device_id` is expected to cascade on device deletion; the
/// views named by [`EmissionSource::view_name`] outer-join usage records up to
/// their campus.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_emission_page(
        &self,
        source: EmissionSource,
        filter: &RowFilter,
        range: PageRange,
    ) -> StoreResult<Vec<EmissionRow>> {
        let sql = format!(
            r#"
            SELECT usage_id::int8 AS usage_id,
                   campus_name,
                   building_name,
                   room_name,
                   device_name,
                   device_power::float8 AS device_power,
                   usage_hours::float8 AS usage_hours,
                   year::int4 AS year,
                   month::int4 AS month
            FROM {view}
            WHERE ($1::text IS NULL OR campus_name ILIKE $1 ESCAPE '\')
              AND ($2::int4 IS NULL OR year = $2)
            ORDER BY usage_id
            LIMIT $3 OFFSET $4
            "#,
            view = source.view_name()
        );
        let rows = sqlx::query_as::<_, EmissionRow>(&sql)
            .bind(filter.campus.as_deref().map(escape_like))
            .bind(filter.year)
            .bind(range.len().max(0))
            .bind(range.from)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn list_campuses(&self) -> StoreResult<Vec<Campus>> {
        let rows = sqlx::query_as(
            r#"
            SELECT campus_id, campus_name
            FROM campuses
            ORDER BY campus_name
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_campus(&self, name: &str) -> StoreResult<Option<Campus>> {
        let row = sqlx::query_as(
            r#"
            SELECT campus_id, campus_name
            FROM campuses
            WHERE campus_name = $1
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_campus(&self, name: &str) -> StoreResult<Campus> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO campuses (campus_name)
            VALUES ($1)
            RETURNING campus_id, campus_name
            "#,
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_building(&self, campus_id: Id, name: &str) -> StoreResult<Option<Building>> {
        let row = sqlx::query_as(
            r#"
            SELECT building_id, building_name, campus_id
            FROM buildings
            WHERE campus_id = $1 AND building_name = $2
            LIMIT 1
            "#,
        )
        .bind(campus_id)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_building_by_name(&self, name: &str) -> StoreResult<Option<Building>> {
        let row = sqlx::query_as(
            r#"
            SELECT building_id, building_name, campus_id
            FROM buildings
            WHERE building_name = $1
            ORDER BY building_id
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_buildings(&self, campus_id: Id) -> StoreResult<Vec<Building>> {
        let rows = sqlx::query_as(
            r#"
            SELECT building_id, building_name, campus_id
            FROM buildings
            WHERE campus_id = $1
            ORDER BY building_name
            "#,
        )
        .bind(campus_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_building(&self, campus_id: Id, name: &str) -> StoreResult<Building> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO buildings (building_name, campus_id)
            VALUES ($1, $2)
            RETURNING building_id, building_name, campus_id
            "#,
        )
        .bind(name)
        .bind(campus_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_room(&self, building_id: Id, name: &str) -> StoreResult<Option<Room>> {
        let row = sqlx::query_as(
            r#"
            SELECT room_id, room_name, building_id
            FROM rooms
            WHERE building_id = $1 AND room_name = $2
            LIMIT 1
            "#,
        )
        .bind(building_id)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_rooms(&self, building_id: Id) -> StoreResult<Vec<Room>> {
        let rows = sqlx::query_as(
            r#"
            SELECT room_id, room_name, building_id
            FROM rooms
            WHERE building_id = $1
            ORDER BY room_name
            "#,
        )
        .bind(building_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_room(&self, building_id: Id, name: &str) -> StoreResult<Room> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO rooms (room_name, building_id)
            VALUES ($1, $2)
            RETURNING room_id, room_name, building_id
            "#,
        )
        .bind(name)
        .bind(building_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn get_device(&self, device_id: Id) -> StoreResult<Option<Device>> {
        let row = sqlx::query_as(
            r#"
            SELECT device_id, device_name, device_power::float8 AS device_power, room_id
            FROM devices
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_devices(&self, room_id: Id) -> StoreResult<Vec<Device>> {
        let rows = sqlx::query_as(
            r#"
            SELECT device_id, device_name, device_power::float8 AS device_power, room_id
            FROM devices
            WHERE room_id = $1
            ORDER BY device_id
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_device(&self, device: &NewDevice) -> StoreResult<Device> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO devices (device_name, device_power, room_id)
            VALUES ($1, $2, $3)
            RETURNING device_id, device_name, device_power::float8 AS device_power, room_id
            "#,
        )
        .bind(&device.device_name)
        .bind(device.device_power)
        .bind(device.room_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_device(
        &self,
        device_id: Id,
        device: &NewDevice,
    ) -> StoreResult<Option<Device>> {
        let row = sqlx::query_as(
            r#"
            UPDATE devices
            SET device_name = $2, device_power = $3, room_id = $4
            WHERE device_id = $1
            RETURNING device_id, device_name, device_power::float8 AS device_power, room_id
            "#,
        )
        .bind(device_id)
        .bind(&device.device_name)
        .bind(device.device_power)
        .bind(device.room_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete_device(&self, device_id: Id) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_usage(&self, usage_id: Id) -> StoreResult<Option<UsageRecord>> {
        let row = sqlx::query_as(
            r#"
            SELECT usage_id, device_id, usage_hours::float8 AS usage_hours, year, month
            FROM device_usage
            WHERE usage_id = $1
            "#,
        )
        .bind(usage_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_usage(
        &self,
        device_id: Id,
        year: i32,
        month: i32,
    ) -> StoreResult<Option<UsageRecord>> {
        let row = sqlx::query_as(
            r#"
            SELECT usage_id, device_id, usage_hours::float8 AS usage_hours, year, month
            FROM device_usage
            WHERE device_id = $1 AND year = $2 AND month = $3
            ORDER BY usage_id
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .bind(year)
        .bind(month)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_usages(&self, device_id: Id) -> StoreResult<Vec<UsageRecord>> {
        let rows = sqlx::query_as(
            r#"
            SELECT usage_id, device_id, usage_hours::float8 AS usage_hours, year, month
            FROM device_usage
            WHERE device_id = $1
            ORDER BY year ASC, month ASC
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_usage(&self, usage: &NewUsage) -> StoreResult<UsageRecord> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO device_usage (device_id, usage_hours, year, month)
            VALUES ($1, $2, $3, $4)
            RETURNING usage_id, device_id, usage_hours::float8 AS usage_hours, year, month
            "#,
        )
        .bind(usage.device_id)
        .bind(usage.usage_hours)
        .bind(usage.year)
        .bind(usage.month)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_usage(
        &self,
        usage_id: Id,
        usage: &NewUsage,
    ) -> StoreResult<Option<UsageRecord>> {
        let row = sqlx::query_as(
            r#"
            UPDATE device_usage
            SET device_id = $2, usage_hours = $3, year = $4, month = $5
            WHERE usage_id = $1
            RETURNING usage_id, device_id, usage_hours::float8 AS usage_hours, year, month
            "#,
        )
        .bind(usage_id)
        .bind(usage.device_id)
        .bind(usage.usage_hours)
        .bind(usage.year)
        .bind(usage.month)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete_usage(&self, usage_id: Id) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM device_usage WHERE usage_id = $1")
            .bind(usage_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn escape_like_neutralises_wildcards() {
        assert_eq!(escape_like("Main"), "Main");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
