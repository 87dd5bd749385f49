use crate::input::{CampusFilter, YearFilter};
use crate::store::{EmissionRow, EmissionSource, PageRange, RowFilter, Store, StoreResult};

/// Rows requested per round trip.
pub const PAGE_SIZE: i64 = 1000;

/// Store predicates for a pair of request filters. `All` adds nothing.
pub fn row_filter(campus: &CampusFilter, year: &YearFilter) -> RowFilter {
    RowFilter {
        campus: campus.value().cloned(),
        year: year.value().copied(),
    }
}

/// Drains `source` page by page until a short or empty page comes back.
///
/// Pages are fetched one after another and concatenated in page order. The
/// first failing page aborts the whole read; nothing partial is returned.
pub async fn fetch_all_rows(
    store: &dyn Store,
    source: EmissionSource,
    filter: &RowFilter,
) -> StoreResult<Vec<EmissionRow>> {
    fetch_all_rows_paged(store, source, filter, PAGE_SIZE).await
}

pub(crate) async fn fetch_all_rows_paged(
    store: &dyn Store,
    source: EmissionSource,
    filter: &RowFilter,
    page_size: i64,
) -> StoreResult<Vec<EmissionRow>> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut page = 0i64;

    loop {
        let range = PageRange::for_page(page, page_size);
        let batch = store
            .fetch_emission_page(source, filter, range)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    source = source.view_name(),
                    page,
                    error = %err,
                    "failed to fetch emission page"
                );
            })?;
        let fetched = batch.len() as i64;
        tracing::debug!(source = source.view_name(), page, rows = fetched, "fetched page");
        rows.extend(batch);

        if fetched < page_size {
            break;
        }
        page += 1;
    }

    tracing::info!(
        source = source.view_name(),
        rows = rows.len(),
        pages = page + 1,
        campus = ?filter.campus,
        year = ?filter.year,
        "fetched emission rows"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Filter;
    use crate::store::{MemoryStore, StoreError};

    fn rows(count: usize) -> Vec<EmissionRow> {
        (0..count)
            .map(|idx| EmissionRow {
                usage_id: Some(idx as i64 + 1),
                campus_name: Some(if idx % 2 == 0 { "North" } else { "South" }.to_string()),
                year: Some(2020 + (idx % 3) as i32),
                month: Some(1),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn drains_every_row_in_order() {
        for (count, page_size, expected_requests) in [
            (0usize, 4i64, 1usize),
            (3, 4, 1),
            (4, 4, 2),
            (9, 4, 3),
            (12, 4, 4),
        ] {
            let store = MemoryStore::from_emission_rows(rows(count));
            let fetched = fetch_all_rows_paged(
                &store,
                EmissionSource::Campus,
                &RowFilter::default(),
                page_size,
            )
            .await
            .unwrap();

            assert_eq!(fetched.len(), count);
            let ids: Vec<i64> = fetched.iter().filter_map(|row| row.usage_id).collect();
            let expected: Vec<i64> = (1..=count as i64).collect();
            assert_eq!(ids, expected);
            assert_eq!(store.page_requests(), expected_requests, "count {count}");
        }
    }

    #[tokio::test]
    async fn default_page_size_handles_more_than_one_page() {
        let store = MemoryStore::from_emission_rows(rows(2500));
        let fetched = fetch_all_rows(&store, EmissionSource::Device, &RowFilter::default())
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2500);
        assert_eq!(store.page_requests(), 3);
    }

    #[tokio::test]
    async fn all_sentinel_adds_no_predicate() {
        let filter = row_filter(&Filter::All, &Filter::All);
        assert_eq!(filter, RowFilter::default());

        let store = MemoryStore::from_emission_rows(rows(10));
        let fetched = fetch_all_rows(&store, EmissionSource::Campus, &filter)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 10);
    }

    #[tokio::test]
    async fn filters_are_pushed_down() {
        let filter = row_filter(&Filter::Only("north".to_string()), &Filter::Only(2020));
        let store = MemoryStore::from_emission_rows(rows(12));
        let fetched = fetch_all_rows(&store, EmissionSource::Campus, &filter)
            .await
            .unwrap();
        assert!(!fetched.is_empty());
        assert!(fetched
            .iter()
            .all(|row| row.campus_name.as_deref() == Some("North") && row.year == Some(2020)));
    }

    #[tokio::test]
    async fn failed_page_aborts_the_read() {
        let store = MemoryStore::from_emission_rows(rows(10));
        store.fail_page(1).await;
        let err = fetch_all_rows_paged(
            &store,
            EmissionSource::Building,
            &RowFilter::default(),
            4,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(err.to_string().contains("building_emissions_view"));
        assert_eq!(store.page_requests(), 2);
    }
}
