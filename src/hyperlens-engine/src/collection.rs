//! Domain-value view of one attribute.

use std::sync::Arc;

use common_error::{LensError, LensResult};
use hyperlens_core::{
    Attribute, AttributeId, Entity, EntityKey, FilterTables, MetaNode, MetadataStore,
};
use hyperlens_store::{AttributeScope, CollectionKind, ColumnarStore, Query, ResultSet};

use crate::cql::QueryBuilder;

/// How [`AttributeValueCollection::switch`] names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRef {
    Id(AttributeId),
    Alias(String),
}

impl From<AttributeId> for AttributeRef {
    fn from(id: AttributeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for AttributeRef {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

/// The values of one attribute as seen from one owning entity.
///
/// A junction attribute has two owners, so the owner in context is part of
/// the collection's identity and scopes every query it builds.
#[derive(Debug)]
pub struct AttributeValueCollection {
    attribute: Attribute,
    owner: Entity,
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn ColumnarStore>,
    filtered: bool,
    last_count: Option<u64>,
    last_query: Option<Query>,
}

impl AttributeValueCollection {
    /// Bind a collection to an attribute node owned by `owner`.
    pub async fn new(
        node: MetaNode,
        owner: EntityKey,
        metadata: Arc<dyn MetadataStore>,
        store: Arc<dyn ColumnarStore>,
    ) -> LensResult<Self> {
        let attribute = node.into_attribute()?;
        if !attribute.is_owned_by(owner) {
            return Err(LensError::construction(format!(
                "attribute `{}` is not owned by entity {owner}",
                attribute.alias
            )));
        }
        let owner = metadata.get_entity(owner).await?;
        let mut collection = Self {
            attribute,
            owner,
            metadata,
            store,
            filtered: false,
            last_count: None,
            last_query: None,
        };
        collection.refresh().await?;
        Ok(collection)
    }

    /// Re-derive the filtered flag and the owner's buffer pointers.
    pub async fn refresh(&mut self) -> LensResult<()> {
        self.owner = self.metadata.get_entity(self.owner.key).await?;
        let view = FilterTables::new(self.owner.key).positions_view();
        self.filtered = self
            .store
            .query(&Query::TableExists { name: view }, "View exists")
            .await?
            .scalar_u64()?
            > 0;
        Ok(())
    }

    /// Number of distinct values, restricted to `pos=1` when filtered.
    pub async fn count(&mut self) -> LensResult<u64> {
        self.refresh().await?;
        let builder = self.query().count(CollectionKind::Set, self.filtered, false);
        let count = self.run(&builder).await?.scalar_u64()?;
        self.last_count = Some(count);
        Ok(count)
    }

    /// Rebind to another attribute of the same owner.
    pub async fn switch(&mut self, target: impl Into<AttributeRef>) -> LensResult<()> {
        let model = self.owner.key.model;
        let attribute = match target.into() {
            AttributeRef::Id(id) => {
                self.metadata
                    .get_attribute(hyperlens_core::AttributeKey::new(model, id))
                    .await?
            }
            AttributeRef::Alias(alias) => self.metadata.find_attribute(model, &alias).await?,
        };
        if !attribute.is_owned_by(self.owner.key) {
            return Err(LensError::metadata(format!(
                "attribute `{}` is not owned by `{}`",
                attribute.alias, self.owner.alias
            )));
        }
        log::debug!("collection switched {} -> {}", self.attribute.alias, attribute.alias);
        self.attribute = attribute;
        self.last_count = None;
        self.last_query = None;
        self.refresh().await
    }

    /// A fresh builder bound to this collection.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(
            self.store.clone(),
            self.scope(),
            self.attribute.alias.clone(),
            self.filtered,
            self.filtered.then(|| self.owner.buffers.old_set.clone()),
        )
    }

    /// Run a builder and remember its query.
    pub async fn run(&mut self, builder: &QueryBuilder) -> LensResult<ResultSet> {
        self.last_query = Some(builder.build()?);
        builder.exe().await
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn owner(&self) -> &Entity {
        &self.owner
    }

    pub fn scope(&self) -> AttributeScope {
        AttributeScope::new(&self.attribute, self.owner.key)
    }

    /// Filtered flag as of the last refresh.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn last_count(&self) -> Option<u64> {
        self.last_count
    }

    /// Query of the last builder run through [`run`](Self::run).
    pub fn last_query(&self) -> Option<&Query> {
        self.last_query.as_ref()
    }
}
