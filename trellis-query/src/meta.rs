//! Entity metadata consumed by the resolvers.
//!
//! The schema collaborator describes each entity once: its fields with
//! identity/uniqueness flags, composite keys, and relations. The resolvers
//! use this to pick a unique-parent filter and to build foreign-key
//! membership predicates; nothing here touches the store.

use indexmap::IndexMap;
use serde_json::Value;
use smol_str::SmolStr;

use crate::descriptor::JsonObject;
use crate::error::{QueryError, QueryResult};

/// A scalar field on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Field name.
    pub name: SmolStr,
    /// Whether this field is the entity's single identifying field.
    pub is_id: bool,
    /// Whether this field carries a single-column unique constraint.
    pub is_unique: bool,
}

impl FieldMeta {
    /// A plain field.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            is_id: false,
            is_unique: false,
        }
    }

    /// An identifying field.
    pub fn id(name: impl Into<SmolStr>) -> Self {
        Self {
            is_id: true,
            ..Self::new(name)
        }
    }

    /// A unique field.
    pub fn unique(name: impl Into<SmolStr>) -> Self {
        Self {
            is_unique: true,
            ..Self::new(name)
        }
    }
}

/// A composite key (primary key or unique index) over several fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    /// Optional name given to the key in the schema.
    pub name: Option<SmolStr>,
    /// The fields making up the key, in declaration order.
    pub fields: Vec<SmolStr>,
}

impl CompositeKey {
    /// An unnamed composite key.
    pub fn new(fields: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// A named composite key.
    pub fn named(
        name: impl Into<SmolStr>,
        fields: impl IntoIterator<Item = impl Into<SmolStr>>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(fields)
        }
    }

    /// The key name used in filter objects: the schema name if given,
    /// otherwise the field names joined with `_`.
    pub fn filter_name(&self) -> SmolStr {
        match &self.name {
            Some(name) => name.clone(),
            None => SmolStr::from(
                self.fields
                    .iter()
                    .map(SmolStr::as_str)
                    .collect::<Vec<_>>()
                    .join("_"),
            ),
        }
    }
}

/// A relation from a parent entity to a target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    /// Relation field name on the parent (e.g. `posts`).
    pub name: SmolStr,
    /// Target entity name (e.g. `Post`).
    pub entity: SmolStr,
    /// Target collection queried to resolve the relation (e.g. `post`).
    pub collection: SmolStr,
    /// Field on the parent row whose value keys the batch
    /// (one-to-many: the parent identifier; many-to-one: the parent-side
    /// foreign key).
    pub parent_field: SmolStr,
    /// Column on the target collection matched by the membership predicate
    /// and used to regroup batch results (one-to-many: the foreign key;
    /// many-to-one: the target identifier).
    pub target_field: SmolStr,
    /// Whether the relation yields a list of rows.
    pub is_list: bool,
    /// Whether the relation is required (non-nullable) on the parent.
    pub is_required: bool,
}

impl RelationMeta {
    /// A one-to-many relation: the target collection carries the foreign
    /// key, the parent is keyed by its identifier.
    pub fn one_to_many(
        name: impl Into<SmolStr>,
        entity: impl Into<SmolStr>,
        collection: impl Into<SmolStr>,
        target_field: impl Into<SmolStr>,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            collection: collection.into(),
            parent_field: SmolStr::new_static("id"),
            target_field: target_field.into(),
            is_list: true,
            is_required: false,
        }
    }

    /// A many-to-one relation: the parent carries the foreign key, the
    /// target is keyed by its identifier.
    pub fn many_to_one(
        name: impl Into<SmolStr>,
        entity: impl Into<SmolStr>,
        collection: impl Into<SmolStr>,
        parent_field: impl Into<SmolStr>,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            collection: collection.into(),
            parent_field: parent_field.into(),
            target_field: SmolStr::new_static("id"),
            is_list: false,
            is_required: false,
        }
    }

    /// Override the parent-side key field.
    pub fn parent_field(mut self, field: impl Into<SmolStr>) -> Self {
        self.parent_field = field.into();
        self
    }

    /// Override the target-side key column.
    pub fn target_field(mut self, field: impl Into<SmolStr>) -> Self {
        self.target_field = field.into();
        self
    }

    /// Mark the relation required.
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }
}

/// Metadata for one entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityMeta {
    /// Entity name (e.g. `User`).
    pub name: SmolStr,
    /// Collection name on the store (e.g. `user`).
    pub collection: SmolStr,
    /// Scalar fields in declaration order.
    pub fields: Vec<FieldMeta>,
    /// Composite primary key, if the entity has one.
    pub primary_key: Option<CompositeKey>,
    /// Unique indexes in declaration order.
    pub unique_indexes: Vec<CompositeKey>,
    /// Relations by field name.
    pub relations: IndexMap<SmolStr, RelationMeta>,
}

impl EntityMeta {
    /// A new entity with no fields.
    pub fn new(name: impl Into<SmolStr>, collection: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the composite primary key.
    pub fn primary_key(mut self, key: CompositeKey) -> Self {
        self.primary_key = Some(key);
        self
    }

    /// Add a unique index.
    pub fn unique_index(mut self, key: CompositeKey) -> Self {
        self.unique_indexes.push(key);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, relation: RelationMeta) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Look up a relation by field name.
    pub fn find_relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.get(name)
    }
}

/// The filter shape that uniquely identifies one row of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKey {
    /// A single identifying or unique field.
    Single(SmolStr),
    /// A named composite key over several fields.
    Composite {
        /// The key name used in filter objects.
        name: SmolStr,
        /// The fields making up the key.
        fields: Vec<SmolStr>,
    },
}

/// Resolve the unique-parent filter key for an entity.
///
/// Resolution order: the single identifying field, else a single unique
/// field, else the composite primary key, else the first listed unique
/// index. An entity with none of these fails with
/// [`QueryError::AmbiguousFilterKey`] before any query is issued.
pub fn filter_key(entity: &EntityMeta) -> QueryResult<FilterKey> {
    if let Some(field) = entity.fields.iter().find(|f| f.is_id) {
        return Ok(FilterKey::Single(field.name.clone()));
    }
    if let Some(field) = entity.fields.iter().find(|f| f.is_unique) {
        return Ok(FilterKey::Single(field.name.clone()));
    }
    if let Some(key) = &entity.primary_key {
        return Ok(FilterKey::Composite {
            name: key.filter_name(),
            fields: key.fields.clone(),
        });
    }
    if let Some(key) = entity.unique_indexes.first() {
        return Ok(FilterKey::Composite {
            name: key.filter_name(),
            fields: key.fields.clone(),
        });
    }
    Err(QueryError::ambiguous_filter_key(entity.name.clone()))
}

/// Build the `where` object that uniquely identifies `row` within its
/// entity, using [`filter_key`].
pub fn unique_filter(entity: &EntityMeta, row: &JsonObject) -> QueryResult<JsonObject> {
    let mut filter = JsonObject::new();
    match filter_key(entity)? {
        FilterKey::Single(field) => {
            let value = row.get(field.as_str()).cloned().unwrap_or(Value::Null);
            filter.insert(field.to_string(), value);
        }
        FilterKey::Composite { name, fields } => {
            let mut composite = JsonObject::new();
            for field in fields {
                let value = row.get(field.as_str()).cloned().unwrap_or(Value::Null);
                composite.insert(field.to_string(), value);
            }
            filter.insert(name.to_string(), Value::Object(composite));
        }
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: serde_json::Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_filter_key_prefers_id_field() {
        let entity = EntityMeta::new("User", "user")
            .field(FieldMeta::id("id"))
            .field(FieldMeta::unique("email"));
        assert_eq!(filter_key(&entity).unwrap(), FilterKey::Single("id".into()));
    }

    #[test]
    fn test_filter_key_falls_back_to_unique_field() {
        let entity = EntityMeta::new("User", "user")
            .field(FieldMeta::new("name"))
            .field(FieldMeta::unique("email"));
        assert_eq!(
            filter_key(&entity).unwrap(),
            FilterKey::Single("email".into())
        );
    }

    #[test]
    fn test_filter_key_prefers_primary_key_over_unique_index() {
        let entity = EntityMeta::new("Membership", "membership")
            .primary_key(CompositeKey::new(["userId", "groupId"]))
            .unique_index(CompositeKey::named("slug_key", ["slug"]));
        assert_eq!(
            filter_key(&entity).unwrap(),
            FilterKey::Composite {
                name: "userId_groupId".into(),
                fields: vec!["userId".into(), "groupId".into()],
            }
        );
    }

    #[test]
    fn test_filter_key_uses_first_listed_unique_index() {
        let entity = EntityMeta::new("Setting", "setting")
            .unique_index(CompositeKey::named("scope_name", ["scope", "name"]))
            .unique_index(CompositeKey::named("other", ["other"]));
        assert_eq!(
            filter_key(&entity).unwrap(),
            FilterKey::Composite {
                name: "scope_name".into(),
                fields: vec!["scope".into(), "name".into()],
            }
        );
    }

    #[test]
    fn test_filter_key_ambiguous() {
        let entity = EntityMeta::new("AuditLog", "auditLog").field(FieldMeta::new("message"));
        let err = filter_key(&entity).unwrap_err();
        assert_eq!(err, QueryError::ambiguous_filter_key("AuditLog"));
    }

    #[test]
    fn test_unique_filter_single() {
        let entity = EntityMeta::new("User", "user").field(FieldMeta::id("id"));
        let filter = unique_filter(&entity, &row(json!({ "id": 7, "name": "x" }))).unwrap();
        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({ "id": 7 }));
    }

    #[test]
    fn test_unique_filter_composite() {
        let entity = EntityMeta::new("Membership", "membership")
            .primary_key(CompositeKey::named("member_pk", ["userId", "groupId"]));
        let filter =
            unique_filter(&entity, &row(json!({ "userId": 1, "groupId": 2 }))).unwrap();
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({ "member_pk": { "userId": 1, "groupId": 2 } })
        );
    }

    #[test]
    fn test_relation_builders() {
        let posts = RelationMeta::one_to_many("posts", "Post", "post", "authorId");
        assert_eq!(posts.parent_field, "id");
        assert!(posts.is_list);

        let author = RelationMeta::many_to_one("author", "User", "user", "authorId").required();
        assert_eq!(author.target_field, "id");
        assert!(author.is_required);
        assert!(!author.is_list);
    }
}
