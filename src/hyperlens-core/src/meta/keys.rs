//! Identifiers and composite keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Data model identifier (`dim4` in the store).
pub type ModelId = u16;

/// Entity identifier, unique within a data model (`hb2` column).
pub type EntityId = u16;

/// Attribute identifier, unique within a data model (`ha2` column).
pub type AttributeId = u16;

/// Hyperatom identifier, unique within an attribute (`ha1` column).
pub type ValueId = u32;

/// Hyperbond (row) identifier, unique within an entity (`hb1` column).
pub type RowId = u32;

/// Composite key of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Owning data model.
    pub model: ModelId,
    /// Entity id within the model.
    pub entity: EntityId,
}

impl EntityKey {
    /// Create a new entity key.
    pub const fn new(model: ModelId, entity: EntityId) -> Self {
        Self { model, entity }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.model, self.entity)
    }
}

/// Composite key of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    /// Owning data model.
    pub model: ModelId,
    /// Attribute id within the model.
    pub attribute: AttributeId,
}

impl AttributeKey {
    /// Create a new attribute key.
    pub const fn new(model: ModelId, attribute: AttributeId) -> Self {
        Self { model, attribute }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.model, self.attribute)
    }
}

/// Key of a dataset (`item == 0`), or of a table or field inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Owning dataset.
    pub dataset: u16,
    /// Table or field id within the dataset; zero for the dataset itself.
    pub item: u16,
}

impl ResourceKey {
    /// Create a new resource key.
    pub const fn new(dataset: u16, item: u16) -> Self {
        Self { dataset, item }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dataset, self.item)
    }
}

/// Key of any metadata node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    /// A data model.
    Model(ModelId),
    /// An entity.
    Entity(EntityKey),
    /// An attribute.
    Attribute(AttributeKey),
    /// A dataset, table or field.
    Resource(ResourceKey),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(m) => write!(f, "model {m}"),
            Self::Entity(k) => write!(f, "entity {k}"),
            Self::Attribute(k) => write!(f, "attribute {k}"),
            Self::Resource(k) => write!(f, "resource {k}"),
        }
    }
}

impl From<EntityKey> for NodeKey {
    fn from(key: EntityKey) -> Self {
        Self::Entity(key)
    }
}

impl From<AttributeKey> for NodeKey {
    fn from(key: AttributeKey) -> Self {
        Self::Attribute(key)
    }
}

impl From<ResourceKey> for NodeKey {
    fn from(key: ResourceKey) -> Self {
        Self::Resource(key)
    }
}
