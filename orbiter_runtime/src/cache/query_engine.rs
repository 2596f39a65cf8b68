// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Query Engine
//!
//! Pure filter/sort/page evaluation over a candidate record set. Nothing
//! here touches the cache's store directly — [`super::RecordCache`]
//! collects the candidates (by type, or by resolving a relationship) and
//! hands them here: a repository owns storage, a stateless service
//! evaluates criteria over whatever the repository produced.

use std::cmp::Ordering;
use std::collections::HashSet;

use orbiter_model::identity::RecordIdentity;
use orbiter_model::query::{
    AttributeFilterOp, Filter, PageSpecifier, RelatedRecordFilterValue, RelatedRecordsFilterOp, SortOrder, SortSpecifier,
};
use orbiter_model::record::{Record, RelationshipValue};
use serde_json::Value;

/// Above this candidate count, filtering fans out across a rayon thread
/// pool instead of running sequentially — small collections stay
/// sequential so pool dispatch overhead never dominates.
const PARALLEL_FILTER_THRESHOLD: usize = 1_000;

/// Applies every filter clause (conjunctively), then the sort order, then
/// the page window, in that order.
pub fn evaluate<'a>(records: Vec<&'a Record>, filters: &[Filter], sort: &[SortSpecifier], page: Option<&PageSpecifier>) -> Vec<&'a Record> {
    let filtered = apply_filters(records, filters);
    let sorted = apply_sort(filtered, sort);
    apply_page(sorted, page)
}

fn apply_filters<'a>(records: Vec<&'a Record>, filters: &[Filter]) -> Vec<&'a Record> {
    if filters.is_empty() {
        return records;
    }
    if records.len() >= PARALLEL_FILTER_THRESHOLD {
        use rayon::prelude::*;
        records.into_par_iter().filter(|record| matches_all(record, filters)).collect()
    } else {
        records.into_iter().filter(|record| matches_all(record, filters)).collect()
    }
}

fn matches_all(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_one(record, filter))
}

fn matches_one(record: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::Attribute { attribute, op, value } => matches_attribute(record, attribute, *op, value),
        Filter::RelatedRecord { relationship, record: wanted } => matches_related_record(record, relationship, wanted),
        Filter::RelatedRecords { relationship, op, records } => matches_related_records(record, relationship, *op, records),
    }
}

fn matches_attribute(record: &Record, attribute: &str, op: AttributeFilterOp, wanted: &Value) -> bool {
    let Some(actual) = record.attribute(attribute) else {
        return false;
    };
    match op {
        AttributeFilterOp::Equal => actual == wanted,
        AttributeFilterOp::Gt | AttributeFilterOp::Gte | AttributeFilterOp::Lt | AttributeFilterOp::Lte => {
            let (Some(a), Some(w)) = (actual.as_f64(), wanted.as_f64()) else {
                return false;
            };
            match op {
                AttributeFilterOp::Gt => a > w,
                AttributeFilterOp::Gte => a >= w,
                AttributeFilterOp::Lt => a < w,
                AttributeFilterOp::Lte => a <= w,
                AttributeFilterOp::Equal => unreachable!(),
            }
        }
    }
}

/// The identities a relatedRecord filter compares against assume a to-one
/// relationship. A to-many value participates only when it happens to hold
/// exactly one identity; otherwise it simply never matches a relatedRecord
/// clause (use a `relatedRecords` filter for that case).
fn singular_identity(value: &RelationshipValue) -> Option<RecordIdentity> {
    match value {
        RelationshipValue::One(id) => id.clone(),
        RelationshipValue::Many(ids) if ids.len() == 1 => Some(ids[0].clone()),
        RelationshipValue::Many(_) => None,
    }
}

fn matches_related_record(record: &Record, relationship: &str, wanted: &RelatedRecordFilterValue) -> bool {
    let current = record.relationship(relationship).map(|r| singular_identity(&r.data)).unwrap_or(None);

    match wanted {
        RelatedRecordFilterValue::One(None) => current.is_none(),
        RelatedRecordFilterValue::One(Some(id)) => current.as_ref() == Some(id),
        RelatedRecordFilterValue::Many(ids) => current.map(|c| ids.contains(&c)).unwrap_or(false),
    }
}

fn matches_related_records(record: &Record, relationship: &str, op: RelatedRecordsFilterOp, wanted: &[RecordIdentity]) -> bool {
    let current: HashSet<RecordIdentity> = record.related_identities(relationship).into_iter().collect();
    let wanted: HashSet<RecordIdentity> = wanted.iter().cloned().collect();

    match op {
        RelatedRecordsFilterOp::Equal => current == wanted,
        RelatedRecordsFilterOp::All => wanted.is_subset(&current),
        RelatedRecordsFilterOp::Some => !current.is_disjoint(&wanted) && !wanted.is_empty(),
        RelatedRecordsFilterOp::None => current.is_disjoint(&wanted),
    }
}

fn apply_sort<'a>(mut records: Vec<&'a Record>, sort: &[SortSpecifier]) -> Vec<&'a Record> {
    if sort.is_empty() {
        return records;
    }
    // `sort_by` is stable, so ties preserve the candidate list's incoming
    // (insertion) order without an explicit tiebreaker.
    records.sort_by(|a, b| compare_by_specifiers(a, b, sort));
    records
}

fn compare_by_specifiers(a: &Record, b: &Record, sort: &[SortSpecifier]) -> Ordering {
    for spec in sort {
        let ordering = compare_attribute(a, b, &spec.attribute);
        let ordering = if spec.order == SortOrder::Desc { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Records lacking the sort attribute always sort after those that have
/// it, regardless of ascending/descending order.
fn compare_attribute(a: &Record, b: &Record, attribute: &str) -> Ordering {
    match (a.attribute(attribute), b.attribute(attribute)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(av), Some(bv)) => compare_values(av, bv),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return a.cmp(b);
    }
    if let (Some(a), Some(b)) = (a.as_bool(), b.as_bool()) {
        return a.cmp(&b);
    }
    a.to_string().cmp(&b.to_string())
}

fn apply_page<'a>(records: Vec<&'a Record>, page: Option<&PageSpecifier>) -> Vec<&'a Record> {
    let Some(page) = page else {
        return records;
    };
    let offset = page.offset.unwrap_or(0);
    let iter = records.into_iter().skip(offset);
    match page.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbiter_model::identity::RecordIdentity;
    use serde_json::json;

    fn planet(name: &str, sequence: i64) -> Record {
        Record::new(RecordIdentity::new("planet", name))
            .with_attribute("name", json!(name))
            .with_attribute("sequence", json!(sequence))
    }

    #[test]
    fn sort_then_page_matches_scenario_1() {
        let jupiter = planet("jupiter", 5);
        let earth = planet("earth", 3);
        let venus = planet("venus", 2);
        let mars = planet("mars", 4);
        let records = vec![&jupiter, &earth, &venus, &mars];

        let sort = vec![SortSpecifier::asc("name")];
        let page = PageSpecifier {
            offset: Some(1),
            limit: Some(2),
        };
        let result = evaluate(records, &[], &sort, Some(&page));

        let names: Vec<_> = result.iter().map(|r| r.attribute("name").unwrap().as_str().unwrap()).collect();
        assert_eq!(names, vec!["jupiter", "mars"]);
    }

    #[test]
    fn compound_attribute_filter_matches_scenario_2() {
        let venus = planet("venus", 2);
        let earth = planet("earth", 3);
        let mars = planet("mars", 4);
        let jupiter = planet("jupiter", 5);
        let saturn = planet("saturn", 1);
        let records = vec![&saturn, &venus, &earth, &mars, &jupiter];

        let filters = vec![
            Filter::Attribute {
                attribute: "sequence".into(),
                op: AttributeFilterOp::Gte,
                value: json!(2),
            },
            Filter::Attribute {
                attribute: "sequence".into(),
                op: AttributeFilterOp::Lt,
                value: json!(4),
            },
        ];
        let result = evaluate(records, &filters, &[], None);

        let names: Vec<_> = result.iter().map(|r| r.attribute("name").unwrap().as_str().unwrap()).collect();
        assert_eq!(names, vec!["venus", "earth"]);
    }

    #[test]
    fn missing_attribute_sorts_after_present_ones() {
        let has_seq = planet("earth", 1);
        let no_seq = Record::new(RecordIdentity::new("planet", "unknown")).with_attribute("name", json!("unknown"));
        let records = vec![&no_seq, &has_seq];

        let result = evaluate(records, &[], &[SortSpecifier::asc("sequence")], None);
        assert_eq!(result[0].identity.id, "earth");
        assert_eq!(result[1].identity.id, "unknown");
    }

    #[test]
    fn related_records_some_matches_non_empty_intersection() {
        let phobos = RecordIdentity::new("moon", "phobos");
        let callisto = RecordIdentity::new("moon", "callisto");
        let mars = Record::new(RecordIdentity::new("planet", "mars"))
            .with_relationship("moons", orbiter_model::record::RelationshipData::many(vec![phobos.clone()]));

        let filter = Filter::RelatedRecords {
            relationship: "moons".into(),
            op: RelatedRecordsFilterOp::Some,
            records: vec![phobos, callisto],
        };
        assert!(matches_one(&mars, &filter));
    }

    #[test]
    fn page_offset_beyond_collection_yields_empty() {
        let earth = planet("earth", 1);
        let page = PageSpecifier {
            offset: Some(5),
            limit: None,
        };
        let result = evaluate(vec![&earth], &[], &[], Some(&page));
        assert!(result.is_empty());
    }
}
