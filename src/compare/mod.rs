//! Run comparison engine.
//!
//! Loads the snapshot sets of two scans for the same site, diffs the URL
//! sets into added / removed / modified / unchanged, and classifies every
//! field-level change with an impact. Scans are immutable, so the engine is
//! a pure function over the two snapshot maps; nothing is memoized.

mod fields;

pub use fields::{added_all, diff_snapshots, field_impact, removed_all};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::store::{Store, StoreError};
use crate::types::{
    ChangeType, ComparisonSummary, PageComparisonResult, PageSnapshot, RunComparison, Scan, ScanId,
};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("scan {0} not found")]
    ScanNotFound(ScanId),
    #[error("scans belong to different sites")]
    SiteMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compare two scans of the same site.
pub async fn compare_scans(
    store: &dyn Store,
    base_id: ScanId,
    compare_id: ScanId,
) -> Result<RunComparison, CompareError> {
    let base_scan = store
        .get_scan(base_id)
        .await?
        .ok_or(CompareError::ScanNotFound(base_id))?;
    let compare_scan = store
        .get_scan(compare_id)
        .await?
        .ok_or(CompareError::ScanNotFound(compare_id))?;
    if base_scan.site_id != compare_scan.site_id {
        return Err(CompareError::SiteMismatch);
    }

    let base_snapshots = snapshot_map(store.snapshots_for_scan(base_id).await?);
    let compare_snapshots = snapshot_map(store.snapshots_for_scan(compare_id).await?);

    Ok(compare_snapshot_sets(
        &base_scan,
        &compare_scan,
        base_snapshots,
        compare_snapshots,
    ))
}

/// Key a scan's snapshots by URL. Snapshot inserts never deduplicate, so a
/// defensive first-wins keeps the map deterministic.
fn snapshot_map(snapshots: Vec<PageSnapshot>) -> BTreeMap<String, PageSnapshot> {
    let mut map = BTreeMap::new();
    for snapshot in snapshots {
        map.entry(snapshot.url.clone()).or_insert(snapshot);
    }
    map
}

/// The pure core: diff two URL-keyed snapshot maps.
fn compare_snapshot_sets(
    base_scan: &Scan,
    compare_scan: &Scan,
    base: BTreeMap<String, PageSnapshot>,
    compare: BTreeMap<String, PageSnapshot>,
) -> RunComparison {
    let mut summary = ComparisonSummary {
        total_base: base.len() as u64,
        total_compare: compare.len() as u64,
        base_error_pages: base_scan.error_pages,
        compare_error_pages: compare_scan.error_pages,
        ..Default::default()
    };

    let urls: std::collections::BTreeSet<String> =
        base.keys().chain(compare.keys()).cloned().collect();

    let mut pages = Vec::with_capacity(urls.len());
    for url in urls {
        let result = match (base.get(&url), compare.get(&url)) {
            (None, Some(new)) => {
                summary.added += 1;
                let changes = added_all(new);
                page_result(url, None, Some(new.clone()), ChangeType::Added, changes)
            }
            (Some(old), None) => {
                summary.removed += 1;
                let changes = removed_all(old);
                page_result(url, Some(old.clone()), None, ChangeType::Removed, changes)
            }
            (Some(old), Some(new)) => {
                let changes = diff_snapshots(old, new);
                if changes.is_empty() {
                    summary.unchanged += 1;
                    page_result(
                        url,
                        Some(old.clone()),
                        Some(new.clone()),
                        ChangeType::Unchanged,
                        changes,
                    )
                } else {
                    summary.modified += 1;
                    page_result(
                        url,
                        Some(old.clone()),
                        Some(new.clone()),
                        ChangeType::Modified,
                        changes,
                    )
                }
            }
            (None, None) => unreachable!("url came from one of the two maps"),
        };
        pages.push(result);
    }

    RunComparison {
        base_scan_id: base_scan.id,
        compare_scan_id: compare_scan.id,
        summary,
        pages,
    }
}

fn page_result(
    url: String,
    base: Option<PageSnapshot>,
    compare: Option<PageSnapshot>,
    change: ChangeType,
    changes: Vec<crate::types::FieldChange>,
) -> PageComparisonResult {
    let severity = changes.iter().map(|c| c.impact).max();
    PageComparisonResult {
        url,
        base,
        compare,
        change,
        changes,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveryMethod, Heading, Impact, ScanSettings, ScanStatus};
    use chrono::Utc;

    fn scan() -> Scan {
        let mut scan = Scan::new(
            uuid::Uuid::new_v4(),
            DiscoveryMethod::Sitemap,
            ScanSettings {
                discovery: Default::default(),
                extraction: Default::default(),
            },
        );
        scan.status = ScanStatus::Completed;
        scan.completed_at = Some(Utc::now());
        scan
    }

    fn snapshot(scan_id: ScanId, url: &str, title: &str, hash: &str) -> PageSnapshot {
        PageSnapshot {
            id: uuid::Uuid::new_v4(),
            scan_id,
            page_id: uuid::Uuid::new_v4(),
            url: url.to_string(),
            title: Some(title.to_string()),
            meta_description: None,
            canonical_url: None,
            breadcrumbs: Vec::new(),
            headings: Vec::new(),
            custom_data: Default::default(),
            content_hash: hash.to_string(),
            response_code: 200,
            load_time_ms: 1,
            extraction_config_id: "default".to_string(),
        }
    }

    fn map(snapshots: Vec<PageSnapshot>) -> BTreeMap<String, PageSnapshot> {
        snapshot_map(snapshots)
    }

    #[test]
    fn two_scan_title_modification() {
        let base_scan = scan();
        let mut compare_scan = scan();
        compare_scan.site_id = base_scan.site_id;

        let base = map(vec![snapshot(base_scan.id, "https://a.example/p", "Old", "h1")]);
        let compare = map(vec![snapshot(compare_scan.id, "https://a.example/p", "New", "h2")]);

        let result = compare_snapshot_sets(&base_scan, &compare_scan, base, compare);
        assert_eq!(result.summary.modified, 1);
        assert_eq!(result.pages.len(), 1);

        let page = &result.pages[0];
        assert_eq!(page.change, ChangeType::Modified);
        assert_eq!(page.severity, Some(Impact::High));
        assert_eq!(page.changes.len(), 1);
        assert_eq!(page.changes[0].field, "title");
        assert_eq!(page.changes[0].old_value.as_deref(), Some("Old"));
        assert_eq!(page.changes[0].new_value.as_deref(), Some("New"));
    }

    #[test]
    fn appearing_and_disappearing_urls() {
        let base_scan = scan();
        let mut compare_scan = scan();
        compare_scan.site_id = base_scan.site_id;

        let base = map(vec![
            snapshot(base_scan.id, "https://a.example/a", "A", "ha"),
            snapshot(base_scan.id, "https://a.example/b", "B", "hb"),
        ]);
        let compare = map(vec![
            snapshot(compare_scan.id, "https://a.example/a", "A", "ha"),
            snapshot(compare_scan.id, "https://a.example/c", "C", "hc"),
        ]);

        let result = compare_snapshot_sets(&base_scan, &compare_scan, base, compare);
        assert_eq!(result.summary.added, 1);
        assert_eq!(result.summary.removed, 1);
        assert_eq!(result.summary.unchanged, 1);
        assert_eq!(result.summary.modified, 0);

        let added = result.pages.iter().find(|p| p.change == ChangeType::Added).unwrap();
        assert_eq!(added.url, "https://a.example/c");
        assert!(added.base.is_none());
        assert!(added.changes.iter().any(|c| c.field == "title"));

        let removed = result.pages.iter().find(|p| p.change == ChangeType::Removed).unwrap();
        assert_eq!(removed.url, "https://a.example/b");
        assert!(removed.compare.is_none());
    }

    #[test]
    fn counters_partition_the_url_union() {
        let base_scan = scan();
        let mut compare_scan = scan();
        compare_scan.site_id = base_scan.site_id;

        let base = map(vec![
            snapshot(base_scan.id, "https://a.example/1", "x", "h"),
            snapshot(base_scan.id, "https://a.example/2", "x", "h"),
            snapshot(base_scan.id, "https://a.example/3", "x", "h"),
        ]);
        let mut changed = snapshot(compare_scan.id, "https://a.example/2", "y", "h2");
        changed.headings = vec![Heading { level: 1, text: "new".to_string() }];
        let compare = map(vec![
            snapshot(compare_scan.id, "https://a.example/1", "x", "h"),
            changed,
            snapshot(compare_scan.id, "https://a.example/4", "x", "h"),
        ]);

        let result = compare_snapshot_sets(&base_scan, &compare_scan, base, compare);
        let s = &result.summary;
        assert_eq!(
            s.added + s.removed + s.modified + s.unchanged,
            result.pages.len() as u64
        );
        assert_eq!(result.pages.len(), 4); // |union of URLs|
        assert_eq!(s.added, 1);
        assert_eq!(s.removed, 1);
        assert_eq!(s.modified, 1);
        assert_eq!(s.unchanged, 1);
    }

    #[test]
    fn inversion_swaps_added_and_removed() {
        let base_scan = scan();
        let mut compare_scan = scan();
        compare_scan.site_id = base_scan.site_id;

        let base = map(vec![
            snapshot(base_scan.id, "https://a.example/a", "Old", "h"),
            snapshot(base_scan.id, "https://a.example/gone", "G", "h"),
        ]);
        let compare = map(vec![
            snapshot(compare_scan.id, "https://a.example/a", "New", "h2"),
            snapshot(compare_scan.id, "https://a.example/fresh", "F", "h"),
        ]);

        let forward =
            compare_snapshot_sets(&base_scan, &compare_scan, base.clone(), compare.clone());
        let backward = compare_snapshot_sets(&compare_scan, &base_scan, compare, base);

        assert_eq!(forward.summary.added, backward.summary.removed);
        assert_eq!(forward.summary.removed, backward.summary.added);
        assert_eq!(forward.summary.unchanged, backward.summary.unchanged);
        assert_eq!(forward.summary.modified, backward.summary.modified);

        let f_mod = forward.pages.iter().find(|p| p.change == ChangeType::Modified).unwrap();
        let b_mod = backward.pages.iter().find(|p| p.change == ChangeType::Modified).unwrap();
        assert_eq!(f_mod.severity, b_mod.severity);
        assert_eq!(f_mod.changes[0].old_value, b_mod.changes[0].new_value);
        assert_eq!(f_mod.changes[0].new_value, b_mod.changes[0].old_value);
    }

    #[test]
    fn unchanged_pages_have_no_severity() {
        let base_scan = scan();
        let mut compare_scan = scan();
        compare_scan.site_id = base_scan.site_id;

        let base = map(vec![snapshot(base_scan.id, "https://a.example/a", "Same", "h")]);
        let compare = map(vec![snapshot(compare_scan.id, "https://a.example/a", "Same", "h")]);

        let result = compare_snapshot_sets(&base_scan, &compare_scan, base, compare);
        assert_eq!(result.pages[0].change, ChangeType::Unchanged);
        assert!(result.pages[0].severity.is_none());
        assert!(result.pages[0].changes.is_empty());
    }

    #[tokio::test]
    async fn store_backed_compare_rejects_cross_site_scans() {
        use crate::store::MemoryStore;

        let store = MemoryStore::new();
        let scan_a = scan();
        let scan_b = scan(); // different random site_id
        let a = store.create_scan(scan_a).await.unwrap();
        let b = store.create_scan(scan_b).await.unwrap();

        let err = compare_scans(&store, a, b).await.unwrap_err();
        assert!(matches!(err, CompareError::SiteMismatch));
    }

    #[tokio::test]
    async fn store_backed_compare_rejects_unknown_scan() {
        use crate::store::MemoryStore;

        let store = MemoryStore::new();
        let missing = uuid::Uuid::new_v4();
        let err = compare_scans(&store, missing, missing).await.unwrap_err();
        assert!(matches!(err, CompareError::ScanNotFound(_)));
    }
}
