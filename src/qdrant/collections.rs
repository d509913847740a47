//! Per-tenant collection provisioning.
//!
//! Each tenant (`bot_id`) owns exactly one collection. [`CollectionManager::ensure`] confirms it
//! exists before every write and creates it lazily when missing, so a collection dropped out of
//! band is recreated on the next job. The vector parameters verified for each tenant are
//! recorded and used for the drift check when the store does not report them. A collection
//! whose size or metric differs from the requested configuration is reported instead of
//! silently reused.

use crate::qdrant::store::VectorStore;
use crate::qdrant::types::{
    CollectionConfig, CreateCollectionOutcome, Distance, QdrantError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised while provisioning a tenant collection.
#[derive(Debug, Error)]
pub enum CollectionProvisionError {
    /// The vector store rejected or failed the lookup/creation request.
    #[error("failed to provision collection '{collection}': {source}")]
    Store {
        /// Collection being provisioned.
        collection: String,
        /// Underlying store error.
        #[source]
        source: QdrantError,
    },
    /// The collection exists with vector parameters that differ from the requested ones.
    #[error(
        "collection '{collection}' exists with size {} / {} but {} / {} was requested",
        .existing.vector_size, .existing.distance, .requested.vector_size, .requested.distance
    )]
    ConfigMismatch {
        /// Collection being provisioned.
        collection: String,
        /// Parameters found on the existing collection.
        existing: CollectionConfig,
        /// Parameters requested by the caller.
        requested: CollectionConfig,
    },
}

/// Ensures tenant collections exist with the expected vector parameters.
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
    provisioned: Mutex<HashMap<String, CollectionConfig>>,
}

impl CollectionManager {
    /// Build a manager backed by the given vector store.
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            provisioned: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure the tenant collection exists with the requested vector parameters.
    ///
    /// Idempotent: an existing matching collection is a no-op, and losing a creation race to
    /// another worker counts as success.
    pub async fn ensure(
        &self,
        tenant_id: &str,
        vector_size: u64,
        distance: Distance,
    ) -> Result<(), CollectionProvisionError> {
        let requested = CollectionConfig {
            vector_size,
            distance,
        };

        let existing = self
            .store
            .collection_info(tenant_id)
            .await
            .map_err(|source| store_error(tenant_id, source))?;

        let verified = match existing {
            Some(info) => info.config.or_else(|| self.recorded(tenant_id)),
            None => {
                if self.forget(tenant_id) {
                    tracing::warn!(
                        collection = tenant_id,
                        "Provisioned collection disappeared; recreating"
                    );
                }
                tracing::info!(
                    collection = tenant_id,
                    vector_size,
                    distance = %distance,
                    "Creating tenant collection"
                );
                match self
                    .store
                    .create_collection(tenant_id, requested)
                    .await
                    .map_err(|source| store_error(tenant_id, source))?
                {
                    CreateCollectionOutcome::Created => Some(requested),
                    CreateCollectionOutcome::AlreadyExists => self
                        .store
                        .collection_info(tenant_id)
                        .await
                        .map_err(|source| store_error(tenant_id, source))?
                        .and_then(|info| info.config),
                }
            }
        };

        match verified {
            Some(existing) => check_matches(tenant_id, existing, requested)?,
            None => tracing::warn!(
                collection = tenant_id,
                "Collection vector parameters unreadable; skipping drift check"
            ),
        }

        self.record(tenant_id, requested);
        tracing::debug!(collection = tenant_id, "Tenant collection ready");
        Ok(())
    }

    fn recorded(&self, tenant_id: &str) -> Option<CollectionConfig> {
        self.provisioned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(tenant_id)
            .copied()
    }

    fn forget(&self, tenant_id: &str) -> bool {
        self.provisioned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(tenant_id)
            .is_some()
    }

    fn record(&self, tenant_id: &str, config: CollectionConfig) {
        self.provisioned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tenant_id.to_string(), config);
    }
}

fn check_matches(
    collection: &str,
    existing: CollectionConfig,
    requested: CollectionConfig,
) -> Result<(), CollectionProvisionError> {
    if existing == requested {
        Ok(())
    } else {
        tracing::error!(
            collection,
            existing_size = existing.vector_size,
            existing_distance = %existing.distance,
            requested_size = requested.vector_size,
            requested_distance = %requested.distance,
            "Collection configuration drift detected"
        );
        Err(CollectionProvisionError::ConfigMismatch {
            collection: collection.to_string(),
            existing,
            requested,
        })
    }
}

fn store_error(collection: &str, source: QdrantError) -> CollectionProvisionError {
    CollectionProvisionError::Store {
        collection: collection.to_string(),
        source,
    }
}
