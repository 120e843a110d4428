//! Metadata dictionary: data models, entities, attributes and the
//! external resources (datasets, tables, fields) mapped onto them.

mod catalog;
mod keys;
mod node;
mod store;

pub use catalog::{Catalog, JunctionFilter};
pub use keys::{
    AttributeId, AttributeKey, EntityId, EntityKey, ModelId, NodeKey, ResourceKey, RowId, ValueId,
};
pub use node::{Attribute, DataModel, DataSet, Entity, Field, Keyed, MetaNode, NodeKind, Table};
pub use store::{InMemoryMetadata, MetadataStore};
