use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::{StreamExt, future, future::BoxFuture};
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{Collection, Draft, Record},
        procedure::{Procedure, ProcedureOutput},
        query::{ChangeEvent, Filter, OrderBy, Patch, Subscription},
        session_store::{ChangeStream, SessionStore},
        storage::{StorageError, StorageResult},
    },
};

use super::{procedures, tables::Tables};

/// Buffered change events per subscriber before the slowest one starts lagging.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// In-process store holding every collection behind one lock.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
    config: Arc<AppConfig>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store drawing topics and missions from `config`.
    pub fn new(config: Arc<AppConfig>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                tables: Mutex::new(Tables::default()),
                changes,
                config,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Toggle availability. While unavailable every call fails with
    /// [`StorageError::Unavailable`], which lets callers exercise their
    /// failure paths.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "in-memory store is switched off".into(),
                io::Error::new(io::ErrorKind::NotConnected, "store offline"),
            ))
        }
    }

    /// Publish events while the caller still holds the table lock.
    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            debug!(
                collection = event.collection().as_str(),
                kind = event.kind.as_str(),
                id = %event.record.id(),
                "publishing change"
            );
            // No receiver simply means nobody is listening yet.
            let _ = self.inner.changes.send(event);
        }
    }
}

impl SessionStore for MemoryStore {
    fn insert(&self, draft: Draft) -> BoxFuture<'static, StorageResult<Record>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let mut tables = store.inner.tables.lock().await;
            let (record, event) = tables.insert(draft)?;
            store.publish(vec![event]);
            Ok(record)
        })
    }

    fn select_one(
        &self,
        collection: Collection,
        filter: Filter,
    ) -> BoxFuture<'static, StorageResult<Option<Record>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let tables = store.inner.tables.lock().await;
            Ok(tables.select(collection, &filter, None).into_iter().next())
        })
    }

    fn select_many(
        &self,
        collection: Collection,
        filter: Filter,
        order_by: Option<OrderBy>,
    ) -> BoxFuture<'static, StorageResult<Vec<Record>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let tables = store.inner.tables.lock().await;
            Ok(tables.select(collection, &filter, order_by.as_ref()))
        })
    }

    fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Patch,
    ) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let mut tables = store.inner.tables.lock().await;
            let events = tables.update(collection, &filter, &patch)?;
            let count = events.len();
            store.publish(events);
            Ok(count)
        })
    }

    fn subscribe(
        &self,
        subscription: Subscription,
    ) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let receiver = store.inner.changes.subscribe();
            let stream = BroadcastStream::new(receiver).filter_map(move |item| {
                future::ready(match item {
                    Ok(event) if subscription.accepts(&event) => Some(event),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(
                            skipped,
                            collection = subscription.collection.as_str(),
                            "change subscriber lagged behind"
                        );
                        None
                    }
                })
            });
            Ok(stream.boxed())
        })
    }

    fn call(&self, procedure: Procedure) -> BoxFuture<'static, StorageResult<ProcedureOutput>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_available()?;
            let name = procedure.name();
            let mut tables = store.inner.tables.lock().await;
            match procedures::run(&mut tables, &store.inner.config, procedure) {
                Ok((output, events)) => {
                    debug!(procedure = name, events = events.len(), "procedure committed");
                    store.publish(events);
                    Ok(output)
                }
                Err(err) => {
                    debug!(procedure = name, error = %err, "procedure refused");
                    Err(err.into())
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_available() })
    }
}
