use std::collections::BTreeMap;

use super::calc::{emission, round3};
use super::policy::BucketKey;
use crate::store::EmissionRow;

/// Per-campus buckets plus a grand total per campus, in kg CO2e.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct CampusEmissions {
    /// campus → bucket (year or month) → kg
    #[schema(value_type = Object)]
    pub emissions: BTreeMap<String, BTreeMap<i32, f64>>,
    /// campus → kg
    #[schema(value_type = Object)]
    pub total_emissions: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct BuildingEmissions {
    pub total_emission: f64,
    /// room → kg
    #[schema(value_type = Object)]
    pub rooms: BTreeMap<String, f64>,
}

pub type BuildingMap = BTreeMap<String, BuildingEmissions>;
pub type DeviceMap = BTreeMap<String, f64>;

/// Folded result plus the number of rows dropped for missing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Folded<T> {
    pub value: T,
    pub skipped: usize,
}

fn add(map: &mut BTreeMap<String, f64>, key: &str, amount: f64) {
    *map.entry(key.to_string()).or_insert(0.0) += amount;
}

fn round_values<K: Ord>(map: &mut BTreeMap<K, f64>) {
    for value in map.values_mut() {
        *value = round3(*value);
    }
}

fn report_skipped(axis: &'static str, skipped: usize) {
    if skipped > 0 {
        tracing::warn!(axis, skipped, "skipped incomplete emission rows");
    }
}

pub fn fold_by_campus(rows: &[EmissionRow], bucket: BucketKey) -> Folded<CampusEmissions> {
    let mut out = CampusEmissions::default();
    let mut skipped = 0;

    for row in rows {
        let (Some(campus), Some(power), Some(hours), Some(_), Some(_), Some(key)) = (
            row.campus_name.as_deref(),
            row.device_power,
            row.usage_hours,
            row.year,
            row.month,
            bucket.of(row),
        ) else {
            tracing::debug!(usage_id = ?row.usage_id, "campus fold: incomplete row");
            skipped += 1;
            continue;
        };

        let value = emission(power, hours);
        add(&mut out.total_emissions, campus, value);
        *out.emissions
            .entry(campus.to_string())
            .or_default()
            .entry(key)
            .or_insert(0.0) += value;
    }

    round_values(&mut out.total_emissions);
    for buckets in out.emissions.values_mut() {
        round_values(buckets);
    }
    report_skipped("campus", skipped);
    Folded {
        value: out,
        skipped,
    }
}

pub fn fold_by_building(rows: &[EmissionRow]) -> Folded<BuildingMap> {
    let mut out = BuildingMap::new();
    let mut skipped = 0;

    for row in rows {
        let (Some(building), Some(room), Some(power), Some(hours)) = (
            row.building_name.as_deref(),
            row.room_name.as_deref(),
            row.device_power,
            row.usage_hours,
        ) else {
            tracing::debug!(usage_id = ?row.usage_id, "building fold: incomplete row");
            skipped += 1;
            continue;
        };

        let value = emission(power, hours);
        let entry = out.entry(building.to_string()).or_default();
        entry.total_emission += value;
        add(&mut entry.rooms, room, value);
    }

    for entry in out.values_mut() {
        entry.total_emission = round3(entry.total_emission);
        round_values(&mut entry.rooms);
    }
    report_skipped("building", skipped);
    Folded {
        value: out,
        skipped,
    }
}

pub fn fold_by_device(rows: &[EmissionRow]) -> Folded<DeviceMap> {
    let mut out = DeviceMap::new();
    let mut skipped = 0;

    for row in rows {
        let (Some(name), Some(power), Some(hours)) =
            (row.device_name.as_deref(), row.device_power, row.usage_hours)
        else {
            tracing::debug!(usage_id = ?row.usage_id, "device fold: incomplete row");
            skipped += 1;
            continue;
        };
        add(&mut out, name, emission(power, hours));
    }

    round_values(&mut out);
    report_skipped("device", skipped);
    Folded {
        value: out,
        skipped,
    }
}
