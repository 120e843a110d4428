//! Metadata node variants.

use std::fmt;

use serde::{Deserialize, Serialize};

use common_error::{LensError, LensResult};

use super::keys::{AttributeKey, EntityId, EntityKey, ModelId, NodeKey, ResourceKey};
use crate::tables::BufferPair;
use crate::types::ValueType;

/// Kind of a metadata node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    DataModel,
    Entity,
    Attribute,
    DataSet,
    Table,
    Field,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DataModel => "DataModel",
            Self::Entity => "Entity",
            Self::Attribute => "Attribute",
            Self::DataSet => "DataSet",
            Self::Table => "Table",
            Self::Field => "Field",
        };
        write!(f, "{name}")
    }
}

/// Identity shared by every metadata node.
pub trait Keyed {
    /// Key of the node.
    fn key(&self) -> NodeKey;

    /// Display name.
    fn name(&self) -> &str;

    /// Short alias used for lookups.
    fn alias(&self) -> &str;

    /// Node kind.
    fn kind(&self) -> NodeKind;
}

/// A data model: the namespace entities and attributes live in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    pub id: ModelId,
    pub name: String,
    pub alias: String,
}

/// An entity (a real-world concept whose rows are hyperbonds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    pub name: String,
    pub alias: String,
    /// Persisted double-buffer pointers of the entity's filter state.
    pub buffers: BufferPair,
}

/// An attribute: a scalar domain of values owned by one entity, or by two
/// entities when it is a junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: AttributeKey,
    pub name: String,
    pub alias: String,
    pub value_type: ValueType,
    pub junction: bool,
    /// Owning entities; exactly two for a junction.
    pub owners: Vec<EntityId>,
}

impl Attribute {
    /// First owning entity.
    pub fn owner(&self) -> EntityKey {
        EntityKey::new(self.key.model, self.owners.first().copied().unwrap_or_default())
    }

    /// Whether `entity` owns this attribute.
    pub fn is_owned_by(&self, entity: EntityKey) -> bool {
        entity.model == self.key.model && self.owners.contains(&entity.entity)
    }

    /// The other owner of a junction attribute.
    pub fn partner_of(&self, entity: EntityKey) -> Option<EntityKey> {
        if !self.junction || !self.is_owned_by(entity) {
            return None;
        }
        self.owners
            .iter()
            .find(|e| **e != entity.entity)
            .map(|e| EntityKey::new(self.key.model, *e))
    }
}

/// An external dataset that tables are imported from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub key: ResourceKey,
    pub name: String,
    pub alias: String,
}

/// A table of an external dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub key: ResourceKey,
    pub name: String,
    pub alias: String,
}

/// A column of an external table, mapped onto attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: ResourceKey,
    pub name: String,
    pub alias: String,
    /// Owning table.
    pub table: ResourceKey,
    /// Attributes whose values come from this field.
    pub attributes: Vec<AttributeKey>,
}

macro_rules! impl_keyed {
    ($ty:ty, $kind:ident, |$s:ident| $key:expr) => {
        impl Keyed for $ty {
            fn key(&self) -> NodeKey {
                let $s = self;
                $key
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn alias(&self) -> &str {
                &self.alias
            }

            fn kind(&self) -> NodeKind {
                NodeKind::$kind
            }
        }
    };
}

impl_keyed!(DataModel, DataModel, |s| NodeKey::Model(s.id));
impl_keyed!(Entity, Entity, |s| NodeKey::Entity(s.key));
impl_keyed!(Attribute, Attribute, |s| NodeKey::Attribute(s.key));
impl_keyed!(DataSet, DataSet, |s| NodeKey::Resource(s.key));
impl_keyed!(Table, Table, |s| NodeKey::Resource(s.key));
impl_keyed!(Field, Field, |s| NodeKey::Resource(s.key));

/// Any metadata node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaNode {
    DataModel(DataModel),
    Entity(Entity),
    Attribute(Attribute),
    DataSet(DataSet),
    Table(Table),
    Field(Field),
}

impl MetaNode {
    fn inner(&self) -> &dyn Keyed {
        match self {
            Self::DataModel(n) => n,
            Self::Entity(n) => n,
            Self::Attribute(n) => n,
            Self::DataSet(n) => n,
            Self::Table(n) => n,
            Self::Field(n) => n,
        }
    }

    /// Unwrap an entity node.
    pub fn into_entity(self) -> LensResult<Entity> {
        match self {
            Self::Entity(e) => Ok(e),
            other => Err(LensError::construction(format!(
                "expected an Entity node, got {} `{}`",
                other.kind(),
                other.alias()
            ))),
        }
    }

    /// Unwrap an attribute node.
    pub fn into_attribute(self) -> LensResult<Attribute> {
        match self {
            Self::Attribute(a) => Ok(a),
            other => Err(LensError::construction(format!(
                "expected an Attribute node, got {} `{}`",
                other.kind(),
                other.alias()
            ))),
        }
    }
}

impl Keyed for MetaNode {
    fn key(&self) -> NodeKey {
        self.inner().key()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn alias(&self) -> &str {
        self.inner().alias()
    }

    fn kind(&self) -> NodeKind {
        self.inner().kind()
    }
}

impl From<Entity> for MetaNode {
    fn from(e: Entity) -> Self {
        Self::Entity(e)
    }
}

impl From<Attribute> for MetaNode {
    fn from(a: Attribute) -> Self {
        Self::Attribute(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn junction() -> Attribute {
        Attribute {
            key: AttributeKey::new(1, 5),
            name: "Supplier Id".to_string(),
            alias: "sid".to_string(),
            value_type: ValueType::UInt32,
            junction: true,
            owners: vec![1, 3],
        }
    }

    #[test]
    fn test_partner_of_junction() {
        let attr = junction();
        assert_eq!(attr.partner_of(EntityKey::new(1, 1)), Some(EntityKey::new(1, 3)));
        assert_eq!(attr.partner_of(EntityKey::new(1, 3)), Some(EntityKey::new(1, 1)));
        assert_eq!(attr.partner_of(EntityKey::new(1, 2)), None);
        assert_eq!(attr.owner(), EntityKey::new(1, 1));
    }

    #[test]
    fn test_into_attribute_rejects_other_kinds() {
        let node = MetaNode::DataModel(DataModel {
            id: 1,
            name: "Sales".to_string(),
            alias: "sales".to_string(),
        });
        assert_eq!(node.kind(), NodeKind::DataModel);
        assert!(matches!(
            node.into_attribute(),
            Err(LensError::Construction(_))
        ));

        let node = MetaNode::from(junction());
        assert_eq!(node.key(), NodeKey::Attribute(AttributeKey::new(1, 5)));
        assert_eq!(node.alias(), "sid");
        assert!(node.into_attribute().is_ok());
    }
}
