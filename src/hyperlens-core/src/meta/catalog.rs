//! In-memory registry of metadata nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common_error::{LensError, LensResult};

use super::keys::{AttributeId, AttributeKey, EntityKey, ModelId, NodeKey, ResourceKey};
use super::node::{Attribute, DataModel, DataSet, Entity, Field, Keyed, MetaNode, Table};
use crate::tables::BufferPair;
use crate::types::ValueType;

/// Which attributes of an entity to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JunctionFilter {
    /// Every attribute.
    #[default]
    All,
    /// Junction attributes only.
    Only,
    /// Non-junction attributes only.
    Exclude,
}

impl JunctionFilter {
    fn admits(self, attribute: &Attribute) -> bool {
        match self {
            Self::All => true,
            Self::Only => attribute.junction,
            Self::Exclude => !attribute.junction,
        }
    }
}

#[derive(Debug, Clone)]
struct ModelEntry {
    model: DataModel,
    entities: BTreeMap<u16, Entity>,
    attributes: BTreeMap<AttributeId, Attribute>,
    /// Next id handed out to an entity or attribute of this model.
    next_id: u16,
}

impl ModelEntry {
    fn allocate(&mut self) -> LensResult<u16> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            LensError::metadata(format!("data model `{}` ran out of ids", self.model.alias))
        })?;
        Ok(id)
    }
}

#[derive(Debug, Clone)]
struct DataSetEntry {
    dataset: DataSet,
    tables: BTreeMap<u16, Table>,
    fields: BTreeMap<u16, Field>,
    next_id: u16,
}

/// Registry of data models, entities, attributes and external resources.
///
/// The catalog owns id allocation: one counter per data model shared by its
/// entities and attributes, and one per dataset for its tables and fields.
/// Ids start at 1.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: BTreeMap<ModelId, ModelEntry>,
    datasets: BTreeMap<u16, DataSetEntry>,
}

impl Catalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn model_entry(&self, model: ModelId) -> LensResult<&ModelEntry> {
        self.models
            .get(&model)
            .ok_or_else(|| LensError::metadata(format!("unknown data model {model}")))
    }

    fn model_entry_mut(&mut self, model: ModelId) -> LensResult<&mut ModelEntry> {
        self.models
            .get_mut(&model)
            .ok_or_else(|| LensError::metadata(format!("unknown data model {model}")))
    }

    fn check_alias(entry: &ModelEntry, alias: &str) -> LensResult<()> {
        let taken = entry.entities.values().any(|e| e.alias == alias)
            || entry.attributes.values().any(|a| a.alias == alias);
        if taken {
            return Err(LensError::metadata(format!(
                "alias `{alias}` already used in data model `{}`",
                entry.model.alias
            )));
        }
        Ok(())
    }

    // Registration

    /// Register a data model.
    pub fn add_data_model(
        &mut self,
        id: ModelId,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> LensResult<ModelId> {
        if self.models.contains_key(&id) {
            return Err(LensError::metadata(format!("data model {id} already exists")));
        }
        let model = DataModel {
            id,
            name: name.into(),
            alias: alias.into(),
        };
        self.models.insert(
            id,
            ModelEntry {
                model,
                entities: BTreeMap::new(),
                attributes: BTreeMap::new(),
                next_id: 1,
            },
        );
        Ok(id)
    }

    /// Register an entity of a data model.
    pub fn add_entity(
        &mut self,
        model: ModelId,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> LensResult<EntityKey> {
        let alias = alias.into();
        let entry = self.model_entry_mut(model)?;
        Self::check_alias(entry, &alias)?;
        let key = EntityKey::new(model, entry.allocate()?);
        entry.entities.insert(
            key.entity,
            Entity {
                key,
                name: name.into(),
                alias,
                buffers: BufferPair::initial(key),
            },
        );
        Ok(key)
    }

    /// Register a non-junction attribute owned by `entity`.
    pub fn add_attribute(
        &mut self,
        entity: EntityKey,
        name: impl Into<String>,
        alias: impl Into<String>,
        value_type: ValueType,
    ) -> LensResult<AttributeKey> {
        self.insert_attribute(entity, None, name.into(), alias.into(), value_type)
    }

    /// Register a junction attribute shared by `left` and `right`.
    pub fn add_junction(
        &mut self,
        left: EntityKey,
        right: EntityKey,
        name: impl Into<String>,
        alias: impl Into<String>,
        value_type: ValueType,
    ) -> LensResult<AttributeKey> {
        if left.model != right.model {
            return Err(LensError::metadata(format!(
                "junction between {left} and {right} crosses data models"
            )));
        }
        if left == right {
            return Err(LensError::metadata(format!(
                "junction of {left} must link two distinct entities"
            )));
        }
        self.insert_attribute(left, Some(right), name.into(), alias.into(), value_type)
    }

    fn insert_attribute(
        &mut self,
        owner: EntityKey,
        partner: Option<EntityKey>,
        name: String,
        alias: String,
        value_type: ValueType,
    ) -> LensResult<AttributeKey> {
        let entry = self.model_entry_mut(owner.model)?;
        for e in std::iter::once(owner).chain(partner) {
            if !entry.entities.contains_key(&e.entity) {
                return Err(LensError::metadata(format!("unknown entity {e}")));
            }
        }
        Self::check_alias(entry, &alias)?;
        let key = AttributeKey::new(owner.model, entry.allocate()?);
        let mut owners = vec![owner.entity];
        owners.extend(partner.map(|p| p.entity));
        entry.attributes.insert(
            key.attribute,
            Attribute {
                key,
                name,
                alias,
                value_type,
                junction: partner.is_some(),
                owners,
            },
        );
        Ok(key)
    }

    /// Register an external dataset.
    pub fn add_dataset(
        &mut self,
        id: u16,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> LensResult<ResourceKey> {
        if self.datasets.contains_key(&id) {
            return Err(LensError::metadata(format!("dataset {id} already exists")));
        }
        let key = ResourceKey::new(id, 0);
        self.datasets.insert(
            id,
            DataSetEntry {
                dataset: DataSet {
                    key,
                    name: name.into(),
                    alias: alias.into(),
                },
                tables: BTreeMap::new(),
                fields: BTreeMap::new(),
                next_id: 1,
            },
        );
        Ok(key)
    }

    /// Register a table of a dataset.
    pub fn add_table(
        &mut self,
        dataset: u16,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> LensResult<ResourceKey> {
        let entry = self.dataset_entry_mut(dataset)?;
        let key = ResourceKey::new(dataset, entry.next_id);
        entry.next_id += 1;
        entry.tables.insert(
            key.item,
            Table {
                key,
                name: name.into(),
                alias: alias.into(),
            },
        );
        Ok(key)
    }

    /// Register a field of a table, mapped onto `attributes`.
    pub fn add_field(
        &mut self,
        table: ResourceKey,
        name: impl Into<String>,
        alias: impl Into<String>,
        attributes: Vec<AttributeKey>,
    ) -> LensResult<ResourceKey> {
        for attr in &attributes {
            self.attribute(*attr)?;
        }
        let entry = self.dataset_entry_mut(table.dataset)?;
        if !entry.tables.contains_key(&table.item) {
            return Err(LensError::metadata(format!("unknown table {table}")));
        }
        let key = ResourceKey::new(table.dataset, entry.next_id);
        entry.next_id += 1;
        entry.fields.insert(
            key.item,
            Field {
                key,
                name: name.into(),
                alias: alias.into(),
                table,
                attributes,
            },
        );
        Ok(key)
    }

    fn dataset_entry_mut(&mut self, dataset: u16) -> LensResult<&mut DataSetEntry> {
        self.datasets
            .get_mut(&dataset)
            .ok_or_else(|| LensError::metadata(format!("unknown dataset {dataset}")))
    }

    // Lookups

    /// Get a data model.
    pub fn data_model(&self, model: ModelId) -> LensResult<&DataModel> {
        Ok(&self.model_entry(model)?.model)
    }

    /// List data model ids.
    pub fn data_models(&self) -> Vec<ModelId> {
        self.models.keys().copied().collect()
    }

    /// Get an entity.
    pub fn entity(&self, key: EntityKey) -> LensResult<&Entity> {
        self.model_entry(key.model)?
            .entities
            .get(&key.entity)
            .ok_or_else(|| LensError::metadata(format!("unknown entity {key}")))
    }

    /// Get an attribute.
    pub fn attribute(&self, key: AttributeKey) -> LensResult<&Attribute> {
        self.model_entry(key.model)?
            .attributes
            .get(&key.attribute)
            .ok_or_else(|| LensError::metadata(format!("unknown attribute {key}")))
    }

    /// Entities of a data model, in id order.
    pub fn entities(&self, model: ModelId) -> LensResult<Vec<&Entity>> {
        Ok(self.model_entry(model)?.entities.values().collect())
    }

    /// Find an entity by alias.
    pub fn find_entity(&self, model: ModelId, alias: &str) -> LensResult<&Entity> {
        let entry = self.model_entry(model)?;
        entry
            .entities
            .values()
            .find(|e| e.alias == alias)
            .ok_or_else(|| {
                LensError::metadata(format!(
                    "no entity `{alias}` in data model `{}`",
                    entry.model.alias
                ))
            })
    }

    /// Find an attribute by alias.
    pub fn find_attribute(&self, model: ModelId, alias: &str) -> LensResult<&Attribute> {
        let entry = self.model_entry(model)?;
        entry
            .attributes
            .values()
            .find(|a| a.alias == alias)
            .ok_or_else(|| {
                LensError::metadata(format!(
                    "no attribute `{alias}` in data model `{}`",
                    entry.model.alias
                ))
            })
    }

    /// Attributes owned by `entity`, in id order.
    pub fn attributes_of(
        &self,
        entity: EntityKey,
        filter: JunctionFilter,
    ) -> LensResult<Vec<&Attribute>> {
        self.entity(entity)?;
        Ok(self
            .model_entry(entity.model)?
            .attributes
            .values()
            .filter(|a| a.is_owned_by(entity) && filter.admits(a))
            .collect())
    }

    /// Entities owning `attribute`.
    pub fn entities_of(&self, attribute: AttributeKey) -> LensResult<Vec<&Entity>> {
        let attr = self.attribute(attribute)?;
        attr.owners
            .iter()
            .map(|e| self.entity(EntityKey::new(attribute.model, *e)))
            .collect()
    }

    /// The two entities joined by a junction attribute.
    pub fn junction_partners(&self, attribute: AttributeKey) -> LensResult<(EntityKey, EntityKey)> {
        let attr = self.attribute(attribute)?;
        match (attr.junction, attr.owners.as_slice()) {
            (true, [left, right]) => Ok((
                EntityKey::new(attribute.model, *left),
                EntityKey::new(attribute.model, *right),
            )),
            _ => Err(LensError::metadata(format!(
                "attribute `{}` is not a junction",
                attr.alias
            ))),
        }
    }

    /// Get any node by key.
    pub fn node(&self, key: NodeKey) -> LensResult<MetaNode> {
        match key {
            NodeKey::Model(m) => self.data_model(m).cloned().map(MetaNode::DataModel),
            NodeKey::Entity(k) => self.entity(k).cloned().map(MetaNode::Entity),
            NodeKey::Attribute(k) => self.attribute(k).cloned().map(MetaNode::Attribute),
            NodeKey::Resource(k) => self.resource(k),
        }
    }

    fn resource(&self, key: ResourceKey) -> LensResult<MetaNode> {
        let entry = self
            .datasets
            .get(&key.dataset)
            .ok_or_else(|| LensError::metadata(format!("unknown dataset {}", key.dataset)))?;
        if key.item == 0 {
            return Ok(MetaNode::DataSet(entry.dataset.clone()));
        }
        if let Some(table) = entry.tables.get(&key.item) {
            return Ok(MetaNode::Table(table.clone()));
        }
        entry
            .fields
            .get(&key.item)
            .cloned()
            .map(MetaNode::Field)
            .ok_or_else(|| LensError::metadata(format!("unknown resource {key}")))
    }

    /// The entity an external field's rows belong to.
    ///
    /// The owner of the first non-junction attribute the field maps onto
    /// wins. Fields mapped only onto junction attributes are not supported.
    pub fn entity_for_field(&self, field: ResourceKey) -> LensResult<EntityKey> {
        let field = match self.resource(field)? {
            MetaNode::Field(f) => f,
            other => {
                return Err(LensError::metadata(format!(
                    "{} `{}` is not a field",
                    other.kind(),
                    other.alias()
                )));
            }
        };
        for key in &field.attributes {
            let attr = self.attribute(*key)?;
            if !attr.junction {
                return Ok(attr.owner());
            }
        }
        Err(LensError::not_implemented(format!(
            "field `{}` maps only onto junction attributes",
            field.alias
        )))
    }

    // Mutation of persisted filter state

    /// Persist the double-buffer pointers of an entity.
    pub fn set_buffers(&mut self, entity: EntityKey, buffers: BufferPair) -> LensResult<()> {
        let entry = self.model_entry_mut(entity.model)?;
        let e = entry
            .entities
            .get_mut(&entity.entity)
            .ok_or_else(|| LensError::metadata(format!("unknown entity {entity}")))?;
        e.buffers = buffers;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> (Catalog, EntityKey, EntityKey, AttributeKey, AttributeKey) {
        let mut catalog = Catalog::new();
        catalog.add_data_model(1, "Supply", "supply").unwrap();
        let supplier = catalog.add_entity(1, "Supplier", "supplier").unwrap();
        let part = catalog.add_entity(1, "Part", "part").unwrap();
        let country = catalog
            .add_attribute(supplier, "Country", "country", ValueType::String)
            .unwrap();
        let sid = catalog
            .add_junction(supplier, part, "Supplier Id", "sid", ValueType::UInt32)
            .unwrap();
        (catalog, supplier, part, country, sid)
    }

    #[test]
    fn test_ids_are_allocated_per_model() {
        let (_, supplier, part, country, sid) = catalog();
        assert_eq!(supplier.entity, 1);
        assert_eq!(part.entity, 2);
        assert_eq!(country.attribute, 3);
        assert_eq!(sid.attribute, 4);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let (mut catalog, supplier, ..) = catalog();
        let err = catalog
            .add_attribute(supplier, "Country again", "country", ValueType::String)
            .unwrap_err();
        assert!(matches!(err, LensError::Metadata(_)));
    }

    #[test]
    fn test_attributes_of_with_junction_filter() {
        let (catalog, supplier, part, ..) = catalog();
        let all: Vec<_> = catalog
            .attributes_of(supplier, JunctionFilter::All)
            .unwrap()
            .iter()
            .map(|a| a.alias.clone())
            .collect();
        assert_eq!(all, vec!["country", "sid"]);
        assert_eq!(
            catalog.attributes_of(part, JunctionFilter::Only).unwrap().len(),
            1
        );
        assert!(
            catalog
                .attributes_of(part, JunctionFilter::Exclude)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_junction_partners() {
        let (catalog, supplier, part, country, sid) = catalog();
        assert_eq!(catalog.junction_partners(sid).unwrap(), (supplier, part));
        assert!(catalog.junction_partners(country).is_err());
        assert_eq!(catalog.entities_of(sid).unwrap().len(), 2);
    }

    #[test]
    fn test_junction_requires_distinct_entities() {
        let (mut catalog, supplier, ..) = catalog();
        assert!(
            catalog
                .add_junction(supplier, supplier, "Self", "self", ValueType::UInt32)
                .is_err()
        );
    }

    #[test]
    fn test_node_lookup_and_find() {
        let (catalog, supplier, _, country, _) = catalog();
        let node = catalog.node(NodeKey::Attribute(country)).unwrap();
        assert_eq!(node.alias(), "country");
        assert_eq!(catalog.find_entity(1, "supplier").unwrap().key, supplier);
        assert!(catalog.find_attribute(1, "missing").is_err());
        assert!(catalog.node(NodeKey::Model(9)).is_err());
    }

    #[test]
    fn test_entity_for_field_prefers_non_junction_attribute() {
        let (mut catalog, supplier, _, country, sid) = catalog();
        catalog.add_dataset(1, "Import", "import").unwrap();
        let table = catalog.add_table(1, "suppliers.csv", "suppliers").unwrap();
        let field = catalog
            .add_field(table, "country", "s_country", vec![sid, country])
            .unwrap();
        assert_eq!(catalog.entity_for_field(field).unwrap(), supplier);

        let junction_only = catalog.add_field(table, "sid", "s_sid", vec![sid]).unwrap();
        assert!(matches!(
            catalog.entity_for_field(junction_only),
            Err(LensError::NotImplemented(_))
        ));
        assert!(catalog.entity_for_field(table).is_err());
    }

    #[test]
    fn test_set_buffers() {
        let (mut catalog, supplier, ..) = catalog();
        let swapped = catalog.entity(supplier).unwrap().buffers.swapped();
        catalog.set_buffers(supplier, swapped.clone()).unwrap();
        assert_eq!(catalog.entity(supplier).unwrap().buffers, swapped);
    }
}
