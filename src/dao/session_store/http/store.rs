use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, Response};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    dao::{
        models::{Collection, Draft, Record},
        procedure::{Procedure, ProcedureOutput},
        query::{Filter, OrderBy, Patch, Subscription},
        session_store::{ChangeStream, SessionStore},
        storage::{StorageError, StorageResult},
    },
    dto::store::{ChangeFeedQuery, ErrorBody, SelectRequest, UpdateRequest, UpdateResponse},
};

use super::{
    config::HttpStoreConfig,
    error::{HttpResult, HttpStoreError},
    sse,
};

const INSERT_PATH: &str = "store/insert";
const SELECT_PATH: &str = "store/select";
const UPDATE_PATH: &str = "store/update";
const RPC_PATH: &str = "rpc";
const CHANGES_PATH: &str = "sse/changes";
const HEALTH_PATH: &str = "healthcheck";

/// Client speaking to a `mission-complete` server over JSON and SSE.
#[derive(Clone)]
pub struct HttpSessionStore {
    client: Client,
    base_url: Arc<str>,
}

impl HttpSessionStore {
    /// Build a client for the server described by `config`.
    pub fn connect(config: HttpStoreConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| HttpStoreError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client.request(method, url)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> StorageResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|source| HttpStoreError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let response = check_status(path, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| {
                HttpStoreError::DecodeResponse {
                    path: path.to_string(),
                    source,
                }
                .into()
            })
    }
}

/// Pass successful responses through; rebuild the store error otherwise.
async fn check_status(path: &str, response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ErrorBody>().await.ok();
    match body {
        Some(ErrorBody {
            procedure_error: Some(procedure_error),
            ..
        }) => Err(StorageError::Procedure(procedure_error)),
        body => Err(HttpStoreError::RequestStatus {
            path: path.to_string(),
            status,
            message: body
                .map(|body| body.message)
                .unwrap_or_else(|| status.to_string()),
        }
        .into()),
    }
}

impl SessionStore for HttpSessionStore {
    fn insert(&self, draft: Draft) -> BoxFuture<'static, StorageResult<Record>> {
        let store = self.clone();
        Box::pin(async move { store.post(INSERT_PATH, &draft).await })
    }

    fn select_one(
        &self,
        collection: Collection,
        filter: Filter,
    ) -> BoxFuture<'static, StorageResult<Option<Record>>> {
        let store = self.clone();
        Box::pin(async move {
            let request = SelectRequest {
                collection,
                filter,
                order_by: None,
                limit: Some(1),
            };
            let records: Vec<Record> = store.post(SELECT_PATH, &request).await?;
            Ok(records.into_iter().next())
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
            let request = SelectRequest {
                collection,
                filter,
                order_by,
                limit: None,
            };
            store.post(SELECT_PATH, &request).await
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
            let request = UpdateRequest {
                collection,
                filter,
                patch,
            };
            let response: UpdateResponse = store.post(UPDATE_PATH, &request).await?;
            Ok(response.updated)
        })
    }

    fn subscribe(
        &self,
        subscription: Subscription,
    ) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        let store = self.clone();
        Box::pin(async move {
            let query = ChangeFeedQuery::from_subscription(&subscription).map_err(|source| {
                HttpStoreError::EncodeQuery {
                    path: CHANGES_PATH.to_string(),
                    source,
                }
            })?;

            let response = store
                .request(Method::GET, CHANGES_PATH)
                .query(&query)
                .send()
                .await
                .map_err(|source| HttpStoreError::RequestSend {
                    path: CHANGES_PATH.to_string(),
                    source,
                })?;
            let response = check_status(CHANGES_PATH, response).await?;

            debug!(
                collection = subscription.collection.as_str(),
                kind = subscription.kind.as_str(),
                "change feed opened"
            );
            Ok(sse::change_stream(response))
        })
    }

    fn call(&self, procedure: Procedure) -> BoxFuture<'static, StorageResult<ProcedureOutput>> {
        let store = self.clone();
        Box::pin(async move { store.post(RPC_PATH, &procedure).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let response = store
                .request(Method::GET, HEALTH_PATH)
                .send()
                .await
                .map_err(|source| HttpStoreError::RequestSend {
                    path: HEALTH_PATH.to_string(),
                    source,
                })?;
            check_status(HEALTH_PATH, response).await.map(|_| ())
        })
    }
}
