//! Emissions aggregation: drain a join view, convert usage to kg CO2e and
//! fold rows into per-campus, per-building and per-device totals.

pub mod calc;
pub mod fetch;
pub mod fold;
pub mod policy;

pub use calc::{emission, kilowatt_hours, round3, EMISSION_FACTOR_KG_PER_KWH};
pub use fetch::{fetch_all_rows, row_filter, PAGE_SIZE};
pub use fold::{
    fold_by_building, fold_by_campus, fold_by_device, BuildingEmissions, BuildingMap,
    CampusEmissions, DeviceMap, Folded,
};
pub use policy::BucketKey;

use crate::input::EmissionFilters;
use crate::store::{EmissionRow, EmissionSource, Store, StoreResult};

async fn rows_for(
    store: &dyn Store,
    source: EmissionSource,
    filters: &EmissionFilters,
) -> StoreResult<Vec<EmissionRow>> {
    let filter = row_filter(&filters.campus, &filters.year);
    fetch_all_rows(store, source, &filter).await
}

pub async fn campus_report(
    store: &dyn Store,
    filters: &EmissionFilters,
) -> StoreResult<CampusEmissions> {
    let rows = rows_for(store, EmissionSource::Campus, filters).await?;
    let bucket = BucketKey::select(&filters.campus, &filters.year);
    Ok(fold_by_campus(&rows, bucket).value)
}

pub async fn building_report(
    store: &dyn Store,
    filters: &EmissionFilters,
) -> StoreResult<BuildingMap> {
    let rows = rows_for(store, EmissionSource::Building, filters).await?;
    Ok(fold_by_building(&rows).value)
}

pub async fn device_report(store: &dyn Store, filters: &EmissionFilters) -> StoreResult<DeviceMap> {
    let rows = rows_for(store, EmissionSource::Device, filters).await?;
    Ok(fold_by_device(&rows).value)
}

/// Unaggregated rows of the device view, for tabular exports.
pub async fn device_rows(
    store: &dyn Store,
    filters: &EmissionFilters,
) -> StoreResult<Vec<EmissionRow>> {
    rows_for(store, EmissionSource::Device, filters).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{parse_emission_query, EmissionQuery};
    use crate::store::{MemoryStore, NewDevice, NewUsage};

    async fn two_device_campus() -> MemoryStore {
        let store = MemoryStore::new();
        let campus = store.insert_campus("A").await.unwrap();
        let building = store
            .insert_building(campus.campus_id, "Main")
            .await
            .unwrap();
        let room = store.insert_room(building.building_id, "101").await.unwrap();
        for (name, power) in [("Lamp", 100.0), ("Monitor", 200.0)] {
            let device = store
                .insert_device(&NewDevice {
                    device_name: name.to_string(),
                    device_power: power,
                    room_id: room.room_id,
                })
                .await
                .unwrap();
            store
                .insert_usage(&NewUsage {
                    device_id: device.device_id,
                    usage_hours: 10.0,
                    year: 2024,
                    month: 1,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn campus_report_for_a_pinned_year_is_monthly() {
        let store = two_device_campus().await;
        let filters = parse_emission_query(EmissionQuery::new(Some("A"), Some("2024"))).unwrap();
        let report = campus_report(&store, &filters).await.unwrap();
        assert_eq!(report.emissions["A"][&1], 1.2);
        assert_eq!(report.total_emissions["A"], 1.2);
    }

    #[tokio::test]
    async fn campus_report_without_year_is_yearly() {
        let store = two_device_campus().await;
        let filters = parse_emission_query(EmissionQuery::new(Some("a"), None)).unwrap();
        let report = campus_report(&store, &filters).await.unwrap();
        assert_eq!(report.emissions["A"][&2024], 1.2);
    }

    #[tokio::test]
    async fn other_years_are_filtered_out() {
        let store = two_device_campus().await;
        let filters = parse_emission_query(EmissionQuery::new(None, Some("2023"))).unwrap();
        assert!(campus_report(&store, &filters)
            .await
            .unwrap()
            .emissions
            .is_empty());
        assert!(device_rows(&store, &filters).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn building_and_device_reports_share_the_rows() {
        let store = two_device_campus().await;
        let filters = parse_emission_query(EmissionQuery::default()).unwrap();

        let buildings = building_report(&store, &filters).await.unwrap();
        assert_eq!(buildings["Main"].total_emission, 1.2);
        assert_eq!(buildings["Main"].rooms["101"], 1.2);

        let devices = device_report(&store, &filters).await.unwrap();
        assert_eq!(devices["Lamp"], 0.4);
        assert_eq!(devices["Monitor"], 0.8);
    }
}
