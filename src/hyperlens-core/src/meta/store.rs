//! Metadata store interface consumed by the engine.

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common_error::LensResult;

use super::catalog::{Catalog, JunctionFilter};
use super::keys::{AttributeKey, EntityKey, ModelId, NodeKey};
use super::node::{Attribute, DataModel, Entity, MetaNode};
use crate::tables::BufferPair;

/// Narrow read interface over the metadata dictionary.
///
/// The only write the engine performs is persisting an entity's
/// double-buffer pointers through [`MetadataStore::set_buffers`].
#[async_trait]
pub trait MetadataStore: Send + Sync + Debug {
    /// Get a data model.
    async fn data_model(&self, model: ModelId) -> LensResult<DataModel>;

    /// Entities of a data model, in id order.
    async fn entities(&self, model: ModelId) -> LensResult<Vec<Entity>>;

    /// Get any node by key.
    async fn get_node(&self, key: NodeKey) -> LensResult<MetaNode>;

    /// Get an entity.
    async fn get_entity(&self, key: EntityKey) -> LensResult<Entity>;

    /// Get an attribute.
    async fn get_attribute(&self, key: AttributeKey) -> LensResult<Attribute>;

    /// Find an attribute of a data model by alias.
    async fn find_attribute(&self, model: ModelId, alias: &str) -> LensResult<Attribute>;

    /// Find an entity of a data model by alias.
    async fn find_entity(&self, model: ModelId, alias: &str) -> LensResult<Entity>;

    /// Attributes owned by an entity.
    async fn attributes_of(
        &self,
        entity: EntityKey,
        filter: JunctionFilter,
    ) -> LensResult<Vec<Attribute>>;

    /// Entities owning an attribute.
    async fn entities_of(&self, attribute: AttributeKey) -> LensResult<Vec<Entity>>;

    /// The two entities joined by a junction attribute.
    async fn junction_partners(&self, attribute: AttributeKey)
    -> LensResult<(EntityKey, EntityKey)>;

    /// Persist the double-buffer pointers of an entity.
    async fn set_buffers(&self, entity: EntityKey, buffers: BufferPair) -> LensResult<()>;
}

/// Metadata store backed by an in-memory [`Catalog`].
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    catalog: RwLock<Catalog>,
}

impl InMemoryMetadata {
    /// Wrap a populated catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
        }
    }

    /// Snapshot of the current catalog.
    pub async fn catalog(&self) -> Catalog {
        self.catalog.read().await.clone()
    }

    /// Edit the catalog in place.
    pub async fn update<R>(&self, edit: impl FnOnce(&mut Catalog) -> R) -> R {
        edit(&mut *self.catalog.write().await)
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadata {
    async fn data_model(&self, model: ModelId) -> LensResult<DataModel> {
        self.catalog.read().await.data_model(model).cloned()
    }

    async fn entities(&self, model: ModelId) -> LensResult<Vec<Entity>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.entities(model)?.into_iter().cloned().collect())
    }

    async fn get_node(&self, key: NodeKey) -> LensResult<MetaNode> {
        self.catalog.read().await.node(key)
    }

    async fn get_entity(&self, key: EntityKey) -> LensResult<Entity> {
        self.catalog.read().await.entity(key).cloned()
    }

    async fn get_attribute(&self, key: AttributeKey) -> LensResult<Attribute> {
        self.catalog.read().await.attribute(key).cloned()
    }

    async fn find_attribute(&self, model: ModelId, alias: &str) -> LensResult<Attribute> {
        self.catalog.read().await.find_attribute(model, alias).cloned()
    }

    async fn find_entity(&self, model: ModelId, alias: &str) -> LensResult<Entity> {
        self.catalog.read().await.find_entity(model, alias).cloned()
    }

    async fn attributes_of(
        &self,
        entity: EntityKey,
        filter: JunctionFilter,
    ) -> LensResult<Vec<Attribute>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .attributes_of(entity, filter)?
            .into_iter()
            .cloned()
            .collect())
    }

    async fn entities_of(&self, attribute: AttributeKey) -> LensResult<Vec<Entity>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.entities_of(attribute)?.into_iter().cloned().collect())
    }

    async fn junction_partners(
        &self,
        attribute: AttributeKey,
    ) -> LensResult<(EntityKey, EntityKey)> {
        self.catalog.read().await.junction_partners(attribute)
    }

    async fn set_buffers(&self, entity: EntityKey, buffers: BufferPair) -> LensResult<()> {
        self.catalog.write().await.set_buffers(entity, buffers)
    }
}
