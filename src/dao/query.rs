//! Query vocabulary shared by every store backend: equality filters, ordering,
//! field patches and change events.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::dao::models::{Collection, Record};

/// Field names a patch is never allowed to touch.
pub const IMMUTABLE_FIELDS: &[&str] = &[
    "id",
    "room_id",
    "player_id",
    "is_host",
    "code",
    "created_at",
];

/// Field names only the atomic procedures write. Lifecycle status, topic,
/// mission status and score would otherwise bypass their transition rules.
pub const PROCEDURE_FIELDS: &[&str] = &["status", "current_topic", "score", "revision"];

/// Single `field == value` clause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct FilterClause {
    /// Top-level field of the record.
    pub field: String,
    /// Expected JSON value.
    #[schema(value_type = Object)]
    pub value: Value,
}

/// Conjunction of equality clauses evaluated against a record's JSON form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Filter {
    /// Clauses that must all hold.
    #[serde(default)]
    pub clauses: Vec<FilterClause>,
}

impl Filter {
    /// Filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a `field == value` clause.
    pub fn with(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.clauses.push(FilterClause {
            field: field.into(),
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        });
        self
    }

    /// Whether the JSON form of a record satisfies every clause.
    pub fn matches_value(&self, value: &Value) -> bool {
        self.clauses
            .iter()
            .all(|clause| value.get(&clause.field) == Some(&clause.value))
    }

    /// Whether `record` satisfies every clause.
    pub fn matches(&self, record: &Record) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        record
            .to_value()
            .map(|value| self.matches_value(&value))
            .unwrap_or(false)
    }
}

/// Sort direction and key for `select_many`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OrderBy {
    /// Field used as the sort key.
    pub field: String,
    /// `true` for ascending order.
    pub ascending: bool,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Stable-sort `records` in place. Equal keys keep their input order.
    pub fn sort(&self, records: &mut [Record]) {
        let mut keyed = records
            .iter()
            .map(|record| {
                record
                    .to_value()
                    .ok()
                    .and_then(|value| value.get(&self.field).cloned())
                    .unwrap_or(Value::Null)
            })
            .zip(records.iter().cloned())
            .collect::<Vec<_>>();

        keyed.sort_by(|(left, _), (right, _)| {
            let ordering = compare_values(left, right);
            if self.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        for (slot, (_, record)) in records.iter_mut().zip(keyed) {
            *slot = record;
        }
    }
}

/// Total-enough ordering over JSON scalars: numbers numerically, strings
/// lexically, booleans false-first. Mixed or compound values compare equal.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Partial update: top-level fields replaced with new JSON values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Patch {
    /// Fields to overwrite.
    #[schema(value_type = Object)]
    pub fields: Map<String, Value>,
}

impl Patch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `field` with `value`.
    pub fn set(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.fields.insert(
            field.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// First immutable field the patch tries to overwrite, if any.
    pub fn immutable_violation(&self) -> Option<&str> {
        self.fields
            .keys()
            .map(String::as_str)
            .find(|field| IMMUTABLE_FIELDS.contains(field))
    }

    /// First procedure-owned field the patch tries to overwrite, if any.
    pub fn procedure_violation(&self) -> Option<&str> {
        self.fields
            .keys()
            .map(String::as_str)
            .find(|field| PROCEDURE_FIELDS.contains(field))
    }

    /// Apply the patch to `record`, returning the updated copy.
    pub fn apply(&self, record: &Record) -> serde_json::Result<Record> {
        let mut value = record.to_value()?;
        if let Value::Object(object) = &mut value {
            for (field, new_value) in &self.fields {
                object.insert(field.clone(), new_value.clone());
            }
        }
        Record::from_value(record.collection(), value)
    }
}

/// Kind of change a subscription listens to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A record was created.
    Insert,
    /// A record was modified.
    Update,
}

impl ChangeKind {
    /// Wire name of the change kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
        }
    }
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ChangeEvent {
    /// Insert or update.
    pub kind: ChangeKind,
    /// Record state after the change.
    pub record: Record,
}

impl ChangeEvent {
    /// Build an insert notification.
    pub fn inserted(record: Record) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
        }
    }

    /// Build an update notification.
    pub fn updated(record: Record) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
        }
    }

    /// Collection the changed record lives in.
    pub fn collection(&self) -> Collection {
        self.record.collection()
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Subscription {
    /// Watched collection.
    pub collection: Collection,
    /// Watched change kind.
    pub kind: ChangeKind,
    /// Equality filter on the changed record.
    #[serde(default)]
    pub filter: Filter,
}

impl Subscription {
    /// Build a subscription.
    pub fn new(collection: Collection, kind: ChangeKind, filter: Filter) -> Self {
        Self {
            collection,
            kind,
            filter,
        }
    }

    /// Whether `event` should be delivered to this subscriber.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        event.kind == self.kind
            && event.collection() == self.collection
            && self.filter.matches(&event.record)
    }
}
