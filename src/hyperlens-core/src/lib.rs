//! Core data model for the hyperlens associative engine.
//!
//! This crate provides the types every other layer shares:
//! - `Value` and `ValueType` for attribute domain values
//! - the metadata dictionary (`MetaNode` and its variants, keys, `Catalog`)
//! - the `MetadataStore` interface the engine reads entities and attributes through
//! - physical table naming (`TableNames`, `FilterTables`, `BufferPair`)

pub mod meta;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use meta::{
    Attribute, AttributeId, AttributeKey, Catalog, DataModel, DataSet, Entity, EntityId,
    EntityKey, Field, InMemoryMetadata, JunctionFilter, Keyed, MetaNode, MetadataStore, ModelId,
    NodeKey, NodeKind, ResourceKey, RowId, Table, ValueId,
};
pub use tables::{BufferPair, FilterTables, TableNames};
pub use types::{Value, ValueType, format_date, parse_date};
