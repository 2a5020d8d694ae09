//! Per-field diff rules: impact classification, scalar and collection
//! field comparison, and positional heading alignment.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{ChangeType, FieldChange, Heading, Impact, PageSnapshot};

/// Separator fixed by the breadcrumb equality rule
const BREADCRUMB_JOIN: &str = " > ";

/// Impact assigned to a change in the named field
pub fn field_impact(field: &str) -> Impact {
    match field {
        "title" => Impact::High,
        "metaDescription" | "canonicalUrl" => Impact::Medium,
        "breadcrumbs" => Impact::Low,
        "header-h1" | "header-h2" => Impact::High,
        "header-h3" | "header-h4" | "header-h5" | "header-h6" => Impact::Medium,
        "price" => Impact::High,
        _ => Impact::Low,
    }
}

fn change(field: &str, kind: ChangeType, old: Option<String>, new: Option<String>) -> FieldChange {
    FieldChange {
        field: field.to_string(),
        change: kind,
        old_value: old,
        new_value: new,
        impact: field_impact(field),
    }
}

/// Diff two snapshots of the same URL into field changes
pub fn diff_snapshots(base: &PageSnapshot, compare: &PageSnapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    diff_scalar(&mut changes, "title", &base.title, &compare.title);
    diff_scalar(
        &mut changes,
        "metaDescription",
        &base.meta_description,
        &compare.meta_description,
    );
    diff_scalar(
        &mut changes,
        "canonicalUrl",
        &base.canonical_url,
        &compare.canonical_url,
    );

    diff_breadcrumbs(&mut changes, &base.breadcrumbs, &compare.breadcrumbs);
    diff_headings(&mut changes, &base.headings, &compare.headings);
    diff_custom(&mut changes, &base.custom_data, &compare.custom_data);

    changes
}

/// Every present field of a newly appeared snapshot as an `Added` change
pub fn added_all(snapshot: &PageSnapshot) -> Vec<FieldChange> {
    field_values(snapshot)
        .into_iter()
        .map(|(field, value)| change(&field, ChangeType::Added, None, Some(value)))
        .collect()
}

/// Every present field of a disappeared snapshot as a `Removed` change
pub fn removed_all(snapshot: &PageSnapshot) -> Vec<FieldChange> {
    field_values(snapshot)
        .into_iter()
        .map(|(field, value)| change(&field, ChangeType::Removed, Some(value), None))
        .collect()
}

/// The present (field, rendered value) pairs of a snapshot
fn field_values(snapshot: &PageSnapshot) -> Vec<(String, String)> {
    let mut values = Vec::new();

    if let Some(title) = &snapshot.title {
        values.push(("title".to_string(), title.clone()));
    }
    if let Some(desc) = &snapshot.meta_description {
        values.push(("metaDescription".to_string(), desc.clone()));
    }
    if let Some(canonical) = &snapshot.canonical_url {
        values.push(("canonicalUrl".to_string(), canonical.clone()));
    }
    if !snapshot.breadcrumbs.is_empty() {
        values.push(("breadcrumbs".to_string(), snapshot.breadcrumbs.join(BREADCRUMB_JOIN)));
    }
    for (key, headings) in group_headings(&snapshot.headings) {
        for heading in headings {
            values.push((format!("header-h{}", key), heading.text.clone()));
        }
    }
    for (name, value) in &snapshot.custom_data {
        values.push((name.clone(), render_value(value)));
    }

    values
}

fn diff_scalar(
    changes: &mut Vec<FieldChange>,
    field: &str,
    base: &Option<String>,
    compare: &Option<String>,
) {
    match (base, compare) {
        (None, Some(new)) => changes.push(change(field, ChangeType::Added, None, Some(new.clone()))),
        (Some(old), None) => {
            changes.push(change(field, ChangeType::Removed, Some(old.clone()), None))
        }
        (Some(old), Some(new)) if old != new => changes.push(change(
            field,
            ChangeType::Modified,
            Some(old.clone()),
            Some(new.clone()),
        )),
        _ => {}
    }
}

/// Breadcrumb trails compare as their ordered join
fn diff_breadcrumbs(changes: &mut Vec<FieldChange>, base: &[String], compare: &[String]) {
    let old = if base.is_empty() {
        None
    } else {
        Some(base.join(BREADCRUMB_JOIN))
    };
    let new = if compare.is_empty() {
        None
    } else {
        Some(compare.join(BREADCRUMB_JOIN))
    };
    diff_scalar(changes, "breadcrumbs", &old, &new);
}

/// Group headings by level, preserving within-level order
fn group_headings(headings: &[Heading]) -> BTreeMap<u8, Vec<&Heading>> {
    let mut grouped: BTreeMap<u8, Vec<&Heading>> = BTreeMap::new();
    for heading in headings {
        grouped.entry(heading.level).or_default().push(heading);
    }
    grouped
}

/// Positional alignment: headings are keyed `(level, index within level)`.
/// A key present only in base is removed, only in compare is added, and
/// differing text at the same key is modified.
fn diff_headings(changes: &mut Vec<FieldChange>, base: &[Heading], compare: &[Heading]) {
    let base_groups = group_headings(base);
    let compare_groups = group_headings(compare);

    let levels: std::collections::BTreeSet<u8> = base_groups
        .keys()
        .chain(compare_groups.keys())
        .copied()
        .collect();

    for level in levels {
        let field = format!("header-h{}", level);
        let empty = Vec::new();
        let base_list = base_groups.get(&level).unwrap_or(&empty);
        let compare_list = compare_groups.get(&level).unwrap_or(&empty);

        let len = base_list.len().max(compare_list.len());
        for index in 0..len {
            match (base_list.get(index), compare_list.get(index)) {
                (Some(old), Some(new)) if old.text != new.text => changes.push(change(
                    &field,
                    ChangeType::Modified,
                    Some(old.text.clone()),
                    Some(new.text.clone()),
                )),
                (Some(old), None) => changes.push(change(
                    &field,
                    ChangeType::Removed,
                    Some(old.text.clone()),
                    None,
                )),
                (None, Some(new)) => changes.push(change(
                    &field,
                    ChangeType::Added,
                    None,
                    Some(new.text.clone()),
                )),
                _ => {}
            }
        }
    }
}

fn diff_custom(
    changes: &mut Vec<FieldChange>,
    base: &BTreeMap<String, Value>,
    compare: &BTreeMap<String, Value>,
) {
    let keys: std::collections::BTreeSet<&String> = base.keys().chain(compare.keys()).collect();
    for key in keys {
        match (base.get(key), compare.get(key)) {
            (Some(old), Some(new)) if old != new => changes.push(change(
                key,
                ChangeType::Modified,
                Some(render_value(old)),
                Some(render_value(new)),
            )),
            (Some(old), None) => {
                changes.push(change(key, ChangeType::Removed, Some(render_value(old)), None))
            }
            (None, Some(new)) => {
                changes.push(change(key, ChangeType::Added, None, Some(render_value(new))))
            }
            _ => {}
        }
    }
}

/// Strings render bare; everything else via JSON serialization
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PageSnapshot {
        PageSnapshot {
            id: uuid::Uuid::new_v4(),
            scan_id: uuid::Uuid::new_v4(),
            page_id: uuid::Uuid::new_v4(),
            url: "https://a.example/p".to_string(),
            title: Some("Old".to_string()),
            meta_description: Some("desc".to_string()),
            canonical_url: None,
            breadcrumbs: vec!["Home".to_string(), "Products".to_string()],
            headings: vec![
                Heading { level: 1, text: "Main".to_string() },
                Heading { level: 2, text: "Sub A".to_string() },
                Heading { level: 2, text: "Sub B".to_string() },
            ],
            custom_data: BTreeMap::new(),
            content_hash: "h".to_string(),
            response_code: 200,
            load_time_ms: 10,
            extraction_config_id: "default".to_string(),
        }
    }

    #[test]
    fn impact_table_matches_the_rules() {
        assert_eq!(field_impact("title"), Impact::High);
        assert_eq!(field_impact("metaDescription"), Impact::Medium);
        assert_eq!(field_impact("canonicalUrl"), Impact::Medium);
        assert_eq!(field_impact("breadcrumbs"), Impact::Low);
        assert_eq!(field_impact("header-h1"), Impact::High);
        assert_eq!(field_impact("header-h2"), Impact::High);
        assert_eq!(field_impact("header-h3"), Impact::Medium);
        assert_eq!(field_impact("header-h6"), Impact::Medium);
        assert_eq!(field_impact("price"), Impact::High);
        assert_eq!(field_impact("sku"), Impact::Low);
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let a = snapshot();
        assert!(diff_snapshots(&a, &a.clone()).is_empty());
    }

    #[test]
    fn title_modification_is_high_impact() {
        let base = snapshot();
        let mut compare = snapshot();
        compare.title = Some("New".to_string());

        let changes = diff_snapshots(&base, &compare);
        assert_eq!(changes.len(), 1);
        let c = &changes[0];
        assert_eq!(c.field, "title");
        assert_eq!(c.change, ChangeType::Modified);
        assert_eq!(c.old_value.as_deref(), Some("Old"));
        assert_eq!(c.new_value.as_deref(), Some("New"));
        assert_eq!(c.impact, Impact::High);
    }

    #[test]
    fn scalar_added_and_removed() {
        let mut base = snapshot();
        base.canonical_url = None;
        let mut compare = snapshot();
        compare.canonical_url = Some("https://a.example/canonical".to_string());
        compare.meta_description = None;

        let changes = diff_snapshots(&base, &compare);
        let canonical = changes.iter().find(|c| c.field == "canonicalUrl").unwrap();
        assert_eq!(canonical.change, ChangeType::Added);
        let desc = changes.iter().find(|c| c.field == "metaDescription").unwrap();
        assert_eq!(desc.change, ChangeType::Removed);
    }

    #[test]
    fn breadcrumbs_compare_as_joined_string() {
        let base = snapshot();
        let mut compare = snapshot();
        compare.breadcrumbs = vec!["Home".to_string(), "Catalog".to_string()];

        let changes = diff_snapshots(&base, &compare);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "breadcrumbs");
        assert_eq!(changes[0].old_value.as_deref(), Some("Home > Products"));
        assert_eq!(changes[0].new_value.as_deref(), Some("Home > Catalog"));
        assert_eq!(changes[0].impact, Impact::Low);
    }

    #[test]
    fn heading_alignment_is_positional_within_level() {
        let base = snapshot();
        let mut compare = snapshot();
        // Second h2 changes text; a third h2 appears
        compare.headings = vec![
            Heading { level: 1, text: "Main".to_string() },
            Heading { level: 2, text: "Sub A".to_string() },
            Heading { level: 2, text: "Sub B2".to_string() },
            Heading { level: 2, text: "Sub C".to_string() },
        ];

        let changes = diff_snapshots(&base, &compare);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.field == "header-h2"));
        let modified = changes.iter().find(|c| c.change == ChangeType::Modified).unwrap();
        assert_eq!(modified.old_value.as_deref(), Some("Sub B"));
        assert_eq!(modified.new_value.as_deref(), Some("Sub B2"));
        let added = changes.iter().find(|c| c.change == ChangeType::Added).unwrap();
        assert_eq!(added.new_value.as_deref(), Some("Sub C"));
    }

    #[test]
    fn heading_level_disappearance_is_removed_per_entry() {
        let base = snapshot();
        let mut compare = snapshot();
        compare.headings = vec![Heading { level: 1, text: "Main".to_string() }];

        let changes = diff_snapshots(&base, &compare);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|c| c.field == "header-h2" && c.change == ChangeType::Removed));
    }

    #[test]
    fn custom_price_change_is_high_impact() {
        let mut base = snapshot();
        base.custom_data
            .insert("price".to_string(), serde_json::json!(10.0));
        let mut compare = snapshot();
        compare
            .custom_data
            .insert("price".to_string(), serde_json::json!(12.5));

        let changes = diff_snapshots(&base, &compare);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "price");
        assert_eq!(changes[0].impact, Impact::High);
        assert_eq!(changes[0].old_value.as_deref(), Some("10.0"));
        assert_eq!(changes[0].new_value.as_deref(), Some("12.5"));
    }

    #[test]
    fn added_all_and_removed_all_mirror_each_other() {
        let snap = snapshot();
        let added = added_all(&snap);
        let removed = removed_all(&snap);

        assert_eq!(added.len(), removed.len());
        assert!(added.iter().all(|c| c.change == ChangeType::Added
            && c.old_value.is_none()
            && c.new_value.is_some()));
        assert!(removed.iter().all(|c| c.change == ChangeType::Removed
            && c.new_value.is_none()
            && c.old_value.is_some()));

        // Fields line up pairwise
        let added_fields: Vec<&str> = added.iter().map(|c| c.field.as_str()).collect();
        let removed_fields: Vec<&str> = removed.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(added_fields, removed_fields);
    }

    #[test]
    fn diff_is_symmetric_under_swap() {
        let base = snapshot();
        let mut compare = snapshot();
        compare.title = Some("New".to_string());
        compare.breadcrumbs.push("Deep".to_string());

        let forward = diff_snapshots(&base, &compare);
        let backward = diff_snapshots(&compare, &base);
        assert_eq!(forward.len(), backward.len());
        for (f, b) in forward.iter().zip(backward.iter()) {
            assert_eq!(f.field, b.field);
            assert_eq!(f.old_value, b.new_value);
            assert_eq!(f.new_value, b.old_value);
            assert_eq!(f.impact, b.impact);
        }
    }
}
