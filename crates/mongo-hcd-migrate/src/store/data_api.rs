//! DataStax HCD target store over the JSON Data API.
//!
//! Every operation is a JSON command POSTed to one of three scopes:
//!
//! - `api/json/v1` (database): `findKeyspaces`, `createKeyspace`
//! - `api/json/v1/{keyspace}`: `findCollections`, `createCollection`
//! - `api/json/v1/{keyspace}/{collection}`: `insertMany`, `insertOne`,
//!   `findOne`, `find`, `countDocuments`
//!
//! A response carrying a non-empty `errors` array is a failure even when the
//! HTTP status is 200.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value as Json};
use tracing::{debug, info};

use super::{Provisioned, TargetCollection, TargetStore};
use crate::config::TargetConfig;
use crate::core::Document;
use crate::error::{MigrateError, Result};

const STORE_NAME: &str = "DataStax HCD";
const API_PATH: &str = "api/json/v1";

/// Maximum documents the Data API accepts in a single `insertMany`.
const MAX_INSERT_MANY: usize = 100;

/// Username/password pair turned into a `Cassandra:` token.
#[derive(Clone)]
pub struct DataApiCredentials {
    pub username: String,
    pub password: String,
}

impl DataApiCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Token header value for username/password authentication.
    pub fn token(&self) -> String {
        format!(
            "Cassandra:{}:{}",
            BASE64.encode(self.username.as_bytes()),
            BASE64.encode(self.password.as_bytes())
        )
    }
}

impl std::fmt::Debug for DataApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

struct Inner {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    keyspace: String,
}

/// Data API client scoped to one keyspace. Cloning shares the HTTP pool.
#[derive(Clone)]
pub struct DataApiTarget {
    inner: Arc<Inner>,
}

impl DataApiTarget {
    /// Build the client and ping the endpoint. Does not create the keyspace.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        info!("Connecting to DataStax HCD...");
        info!("   Endpoint: {}", config.endpoint);
        info!("   Username: {}", config.username);
        info!("   Keyspace: {}", config.keyspace);

        let credentials = DataApiCredentials::new(&config.username, &config.password);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MigrateError::connection(STORE_NAME, e))?;

        let target = Self {
            inner: Arc::new(Inner {
                http,
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
                token: credentials.token(),
                keyspace: config.keyspace.clone(),
            }),
        };

        target
            .ping()
            .await
            .map_err(|e| MigrateError::connection(STORE_NAME, e))?;

        info!("DataStax HCD connection established successfully");
        Ok(target)
    }

    fn url(&self, scope: &[&str]) -> String {
        let mut url = format!("{}/{}", self.inner.endpoint, API_PATH);
        for part in scope {
            url.push('/');
            url.push_str(part);
        }
        url
    }

    /// POST one command and return the parsed body, failing on `errors`.
    async fn command(&self, scope: &[&str], body: Json) -> Result<Json> {
        let response = self.raw_command(scope, body).await?;
        if let Some(message) = error_message(&response) {
            return Err(MigrateError::api(200, message));
        }
        Ok(response)
    }

    /// POST one command; only HTTP-level failures are errors.
    async fn raw_command(&self, scope: &[&str], body: Json) -> Result<Json> {
        let url = self.url(scope);
        debug!("Data API POST {}", url);

        let response = self
            .inner
            .http
            .post(&url)
            .header("Token", &self.inner.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(MigrateError::api(status.as_u16(), text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn keyspace_names(&self) -> Result<Vec<String>> {
        let response = self.command(&[], json!({ "findKeyspaces": {} })).await?;
        Ok(string_list(&response["status"]["keyspaces"]))
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let response = self
            .command(&[&self.inner.keyspace], json!({ "findCollections": {} }))
            .await?;
        Ok(string_list(&response["status"]["collections"]))
    }

    fn collection(&self, name: &str) -> Arc<dyn TargetCollection> {
        Arc::new(DataApiCollection {
            target: self.clone(),
            keyspace: self.inner.keyspace.clone(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl TargetStore for DataApiTarget {
    async fn ping(&self) -> Result<bool> {
        self.keyspace_names().await?;
        Ok(true)
    }

    async fn ensure_keyspace(&self, name: &str) -> Result<Provisioned> {
        if self.keyspace_names().await?.iter().any(|k| k == name) {
            return Ok(Provisioned::AlreadyExists);
        }
        self.command(&[], json!({ "createKeyspace": { "name": name } }))
            .await?;
        Ok(Provisioned::Created)
    }

    async fn create_or_get_collection(
        &self,
        name: &str,
    ) -> Result<(Arc<dyn TargetCollection>, Provisioned)> {
        let exists = self.collection_names().await?.iter().any(|c| c == name);

        let provisioned = if exists {
            Provisioned::AlreadyExists
        } else {
            self.command(
                &[&self.inner.keyspace],
                json!({ "createCollection": { "name": name } }),
            )
            .await?;
            Provisioned::Created
        };
        Ok((self.collection(name), provisioned))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Arc<dyn TargetCollection>>> {
        // findCollections fails on a missing keyspace
        if !self
            .keyspace_names()
            .await?
            .iter()
            .any(|k| k == &self.inner.keyspace)
        {
            return Ok(None);
        }
        let exists = self.collection_names().await?.iter().any(|c| c == name);
        Ok(exists.then(|| self.collection(name)))
    }

    fn store_type(&self) -> &'static str {
        STORE_NAME
    }
}

/// One collection inside the client's keyspace.
///
/// HCD assigns its own `_id` and keeps no unique index on the domain
/// identity field, so inserting a record that already exists creates a
/// second copy instead of failing. Re-runs against a populated collection
/// therefore duplicate documents; only [`MemoryTarget`](super::MemoryTarget)
/// rejects them as [`MigrateError::DuplicateIdentity`].
pub struct DataApiCollection {
    target: DataApiTarget,
    keyspace: String,
    name: String,
}

impl DataApiCollection {
    async fn command(&self, body: Json) -> Result<Json> {
        self.target.command(&[&self.keyspace, &self.name], body).await
    }

    /// Exact count by paging through `_id` projections, for collections
    /// larger than the `countDocuments` limit.
    async fn count_by_paging(&self, filter: &Document) -> Result<u64> {
        let mut total = 0u64;
        let mut page_state: Option<String> = None;
        loop {
            let mut options = json!({});
            if let Some(state) = &page_state {
                options["pageState"] = Json::String(state.clone());
            }
            let response = self
                .command(json!({
                    "find": {
                        "filter": filter.to_json(),
                        "projection": { "_id": 1 },
                        "options": options,
                    }
                }))
                .await?;
            total += response["data"]["documents"]
                .as_array()
                .map(|docs| docs.len() as u64)
                .unwrap_or(0);
            match response["data"]["nextPageState"].as_str() {
                Some(next) => page_state = Some(next.to_string()),
                None => return Ok(total),
            }
        }
    }
}

#[async_trait]
impl TargetCollection for DataApiCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<usize> {
        let mut inserted = 0usize;
        for chunk in documents.chunks(MAX_INSERT_MANY) {
            let body = json!({
                "insertMany": {
                    "documents": chunk.iter().map(Document::to_json).collect::<Vec<_>>(),
                    "options": { "ordered": true },
                }
            });
            let response = self
                .target
                .raw_command(&[&self.keyspace, &self.name], body)
                .await
                .map_err(|e| MigrateError::bulk_write(inserted, e))?;

            // Ordered inserts stop at the first failure; everything before it
            // is committed.
            let chunk_inserted = response["status"]["insertedIds"]
                .as_array()
                .map(Vec::len)
                .unwrap_or(0);
            inserted += chunk_inserted;

            if let Some(message) = error_message(&response) {
                return Err(MigrateError::bulk_write(inserted, message));
            }
        }
        Ok(inserted)
    }

    async fn insert_one(&self, document: &Document) -> Result<String> {
        let response = self
            .command(json!({ "insertOne": { "document": document.to_json() } }))
            .await?;
        let id = &response["status"]["insertedIds"][0];
        Ok(match id {
            Json::String(s) => s.clone(),
            Json::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        let response = self
            .command(json!({ "findOne": { "filter": filter.to_json() } }))
            .await?;
        Ok(Document::from_json(&response["data"]["document"]))
    }

    async fn count(&self, filter: &Document) -> Result<u64> {
        let response = self
            .command(json!({ "countDocuments": { "filter": filter.to_json() } }))
            .await?;
        if response["status"]["moreData"].as_bool().unwrap_or(false) {
            debug!(
                "{}: count exceeds countDocuments limit, paging instead",
                self.name
            );
            return self.count_by_paging(filter).await;
        }
        response["status"]["count"]
            .as_u64()
            .ok_or_else(|| MigrateError::api(200, "countDocuments response has no count"))
    }
}

/// Join the `errors` array of a response into one message, if present.
fn error_message(response: &Json) -> Option<String> {
    let errors = response.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    let parts: Vec<String> = errors
        .iter()
        .map(|err| {
            let code = err["errorCode"].as_str().unwrap_or("UNKNOWN");
            let message = err["message"].as_str().unwrap_or("no message");
            format!("{}: {}", code, message)
        })
        .collect();
    Some(parts.join("; "))
}

fn string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Json::String(s) => Some(s.clone()),
                    // findCollections with `explain` returns objects
                    Json::Object(obj) => obj.get("name").and_then(Json::as_str).map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
