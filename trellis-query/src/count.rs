//! Folding aggregate-count requests into query descriptors.

use crate::descriptor::{CountMap, IncludeField, IncludeMap, JsonObject, QueryDescriptor};
use crate::selection::COUNT_FIELD;

/// Merge a relation-count request into a descriptor's `include`.
///
/// Entries whose value is null are dropped. If every entry is dropped (or
/// the request is absent) the merge is a strict no-op: no `_count` key is
/// added and an empty `_count.select` is never produced.
pub fn merge_count(request: Option<CountMap>, mut descriptor: QueryDescriptor) -> QueryDescriptor {
    let Some(request) = request else {
        return descriptor;
    };
    let counts: CountMap = request
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect();
    if counts.is_empty() {
        return descriptor;
    }
    descriptor
        .include
        .get_or_insert_with(IncludeMap::new)
        .insert(COUNT_FIELD.into(), IncludeField::Count(counts));
    descriptor
}

/// Merge aggregate pickers (`_count`/`_avg`/`_sum`/`_min`/`_max`) into a
/// descriptor's pass-through keys, dropping null members.
pub fn merge_aggregate(pickers: JsonObject, mut descriptor: QueryDescriptor) -> QueryDescriptor {
    for (name, value) in pickers {
        if value.is_null() {
            continue;
        }
        descriptor.extra.insert(name, value);
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::QueryArgs;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    #[test]
    fn test_merge_count_drops_null_entries() {
        let mut request = CountMap::new();
        request.insert("posts".into(), json!({ "where": { "color": "RED" } }));
        request.insert("comments".into(), Value::Null);

        let merged = merge_count(Some(request), QueryDescriptor::new());

        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!({
                "include": {
                    "_count": { "select": { "posts": { "where": { "color": "RED" } } } }
                }
            })
        );
    }

    #[test]
    fn test_merge_count_all_null_is_noop() {
        let mut request = CountMap::new();
        request.insert("posts".into(), Value::Null);
        request.insert("comments".into(), Value::Null);

        let merged = merge_count(Some(request), QueryDescriptor::new());
        assert_eq!(merged.include, None);
        assert_eq!(serde_json::to_value(&merged).unwrap(), json!({}));
    }

    #[test]
    fn test_merge_count_absent_is_noop() {
        let base = QueryDescriptor::from(QueryArgs::new().take(1));
        let merged = merge_count(None, base.clone());
        assert_eq!(merged, base);
    }

    #[test]
    fn test_merge_count_preserves_existing_include() {
        let node = crate::selection::parse(&json!({ "id": {}, "city": { "id": {} } }), &[]);
        let base = crate::plan::build_query_with_include(QueryArgs::new(), &node, None);

        let mut request = CountMap::new();
        request.insert("posts".into(), json!(true));
        let merged = merge_count(Some(request), base);

        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!({
                "include": {
                    "city": { "select": { "id": true } },
                    "_count": { "select": { "posts": true } }
                }
            })
        );
    }

    #[test]
    fn test_merge_aggregate_drops_null_members() {
        let pickers = match json!({ "_count": { "_all": true }, "_avg": null }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let merged = merge_aggregate(pickers, QueryDescriptor::new());
        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!({ "_count": { "_all": true } })
        );
    }
}
