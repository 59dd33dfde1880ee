use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::{
        models::Collection,
        procedure::ProcedureError,
        query::{ChangeKind, Filter, OrderBy, Patch, Subscription},
    },
    dto::validation::validate_patch,
};

/// Largest page `/store/select` hands out in one response.
pub const MAX_SELECT_LIMIT: usize = 1000;

/// Body of `POST /store/select`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SelectRequest {
    /// Collection to read.
    pub collection: Collection,
    /// Equality clauses; empty selects everything.
    #[serde(default)]
    pub filter: Filter,
    /// Optional sort; insertion order otherwise.
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    /// Maximum number of records returned.
    #[serde(default)]
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

/// Body of `POST /store/update`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateRequest {
    /// Collection to patch.
    pub collection: Collection,
    /// Records to patch.
    #[serde(default)]
    pub filter: Filter,
    /// Replacement field values.
    #[validate(custom(function = "validate_patch"))]
    pub patch: Patch,
}

/// Response of `POST /store/update`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateResponse {
    /// Number of records patched.
    pub updated: usize,
}

/// Query string of `GET /sse/changes`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChangeFeedQuery {
    /// Watched collection.
    pub collection: Collection,
    /// Watched change kind.
    pub kind: ChangeKind,
    /// JSON-encoded [`Filter`]; absent watches every record.
    #[serde(default)]
    pub filter: Option<String>,
}

impl ChangeFeedQuery {
    /// Encode a subscription as query parameters.
    pub fn from_subscription(subscription: &Subscription) -> serde_json::Result<Self> {
        let filter = if subscription.filter.clauses.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&subscription.filter)?)
        };
        Ok(Self {
            collection: subscription.collection,
            kind: subscription.kind,
            filter,
        })
    }

    /// Decode the query parameters back into a subscription.
    pub fn into_subscription(self) -> serde_json::Result<Subscription> {
        let filter = match self.filter.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Filter::all(),
        };
        Ok(Subscription::new(self.collection, self.kind, filter))
    }
}

/// Error payload returned by every failing route.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Structured refusal when a procedure rejected the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_error: Option<ProcedureError>,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn change_feed_query_carries_the_filter() {
        let room_id = Uuid::new_v4();
        let subscription = Subscription::new(
            Collection::Missions,
            ChangeKind::Update,
            Filter::all().with("room_id", room_id),
        );

        let query = ChangeFeedQuery::from_subscription(&subscription).unwrap();
        assert!(query.filter.as_deref().unwrap().contains(&room_id.to_string()));
        assert_eq!(query.into_subscription().unwrap(), subscription);
    }

    #[test]
    fn update_request_refuses_immutable_and_procedure_fields() {
        let request = UpdateRequest {
            collection: Collection::Players,
            filter: Filter::all(),
            patch: Patch::new().set("room_id", Uuid::nil()),
        };
        assert!(request.validate().is_err());

        let request = UpdateRequest {
            patch: Patch::new().set("score", 3),
            ..request
        };
        assert!(request.validate().is_err());

        let request = UpdateRequest {
            patch: Patch::new().set("name", "Ally"),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn select_limit_is_bounded() {
        let mut request = SelectRequest {
            collection: Collection::Rooms,
            filter: Filter::all(),
            order_by: None,
            limit: Some(0),
        };
        assert!(request.validate().is_err());
        request.limit = Some(MAX_SELECT_LIMIT);
        assert!(request.validate().is_ok());
        request.limit = None;
        assert!(request.validate().is_ok());
    }
}
