#[cfg(feature = "http-store")]
pub mod http;
pub mod memory;

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::{
    models::{Collection, Draft, Record},
    procedure::{Procedure, ProcedureOutput},
    query::{ChangeEvent, Filter, OrderBy, Patch, Subscription},
    storage::StorageResult,
};

/// Stream of change events matching a [`Subscription`].
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

/// Abstraction over the persistence layer holding rooms, players and missions.
pub trait SessionStore: Send + Sync {
    fn insert(&self, draft: Draft) -> BoxFuture<'static, StorageResult<Record>>;
    fn select_one(
        &self,
        collection: Collection,
        filter: Filter,
    ) -> BoxFuture<'static, StorageResult<Option<Record>>>;
    fn select_many(
        &self,
        collection: Collection,
        filter: Filter,
        order_by: Option<OrderBy>,
    ) -> BoxFuture<'static, StorageResult<Vec<Record>>>;
    fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Patch,
    ) -> BoxFuture<'static, StorageResult<usize>>;
    fn subscribe(&self, subscription: Subscription)
    -> BoxFuture<'static, StorageResult<ChangeStream>>;
    fn call(&self, procedure: Procedure) -> BoxFuture<'static, StorageResult<ProcedureOutput>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
