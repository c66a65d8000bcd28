//! MongoDB source store.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use super::SourceStore;
use crate::config::{mask_uri, SourceConfig};
use crate::core::Document;
use crate::error::{MigrateError, Result};

const STORE_NAME: &str = "MongoDB";

/// MongoDB source backed by the driver's internal connection pool.
#[derive(Clone)]
pub struct MongoSource {
    client: Client,
    db: Database,
}

impl MongoSource {
    /// Connect and ping. Any failure is a [`MigrateError::Connection`].
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        info!("Connecting to MongoDB...");
        info!("   URI: {}", mask_uri(&config.uri));
        info!("   Database: {}", config.database);

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| MigrateError::connection(STORE_NAME, e))?;
        options.app_name = Some("mongo-hcd-migrate".to_string());
        options.server_selection_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        if let Some(max) = config.max_pool_size {
            options.max_pool_size = Some(max);
        }

        let client =
            Client::with_options(options).map_err(|e| MigrateError::connection(STORE_NAME, e))?;
        let db = client.database(&config.database);
        let source = Self { client, db };

        source
            .ping()
            .await
            .map_err(|e| MigrateError::connection(STORE_NAME, e))?;

        info!("MongoDB connection established successfully");
        Ok(source)
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.db.collection::<bson::Document>(name)
    }
}

#[async_trait]
impl SourceStore for MongoSource {
    async fn ping(&self) -> Result<bool> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(true)
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64> {
        let count = self
            .collection(collection)
            .count_documents(filter.to_bson())
            .await?;
        Ok(count)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>> {
        debug!(
            "find on {}.{} (skip: {}, limit: {})",
            self.db.name(),
            collection,
            skip,
            limit
        );
        // Sorting on _id keeps skip/limit windows stable between calls.
        let cursor = self
            .collection(collection)
            .find(filter.to_bson())
            .sort(doc! { "_id": 1 })
            .skip(skip)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await?;
        let docs: Vec<bson::Document> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(Document::from).collect())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        let doc = self
            .collection(collection)
            .find_one(filter.to_bson())
            .sort(doc! { "_id": 1 })
            .await?;
        Ok(doc.map(Document::from))
    }

    fn store_type(&self) -> &'static str {
        STORE_NAME
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB connection closed");
    }
}
