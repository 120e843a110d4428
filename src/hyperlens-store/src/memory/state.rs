//! Hyperatom, incidence and state tables held in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use common_error::{LensError, LensResult};
use hyperlens_core::{AttributeId, EntityId, ModelId, RowId, Value, ValueId};

use crate::query::AttributeScope;

/// `(model, ha2, hb2, ha1)`: one dictionary row.
pub(super) type AtomKey = (ModelId, AttributeId, EntityId, ValueId);

/// `(model, hb2, ha2, ha1)`: one states row, partitioned by `(hb2, ha2)`.
pub(super) type StateKey = (ModelId, EntityId, AttributeId, ValueId);

/// A hyperatom: one distinct value and the rows referencing it.
#[derive(Debug, Clone)]
pub(super) struct Atom {
    pub value: Value,
    pub rows: BTreeSet<RowId>,
}

/// Filter state of one hyperatom.
#[derive(Debug, Clone, Default)]
pub(super) struct StateRow {
    pub rows: BTreeSet<RowId>,
    pub pos: u8,
    pub sel: u8,
}

impl StateRow {
    pub fn clear(&mut self) {
        self.rows.clear();
        self.pos = 0;
        self.sel = 0;
    }
}

/// A dictionary row visible through an [`AttributeScope`].
#[derive(Debug, Clone, Copy)]
pub(super) struct ScopedAtom<'a> {
    pub owner: EntityId,
    pub value_id: ValueId,
    pub atom: &'a Atom,
}

#[derive(Debug, Default)]
pub(super) struct MemoryState {
    pub atoms: BTreeMap<AtomKey, Atom>,
    pub states: BTreeMap<StateKey, StateRow>,
    value_ids: HashMap<(ModelId, AttributeId, String), ValueId>,
    next_value_id: HashMap<(ModelId, AttributeId), ValueId>,
    pub tables: HashMap<String, BTreeSet<u32>>,
    pub views: BTreeSet<String>,
}

impl MemoryState {
    /// Value id of `value` in an attribute's dictionary, allocated on first use.
    pub fn value_id(&mut self, model: ModelId, attribute: AttributeId, value: &Value) -> ValueId {
        let key = (model, attribute, value.dictionary_key());
        if let Some(id) = self.value_ids.get(&key) {
            return *id;
        }
        let next = self.next_value_id.entry((model, attribute)).or_insert(1);
        let id = *next;
        *next += 1;
        self.value_ids.insert(key, id);
        id
    }

    /// Value id of `value` if it was ever loaded.
    pub fn lookup_value_id(
        &self,
        model: ModelId,
        attribute: AttributeId,
        value: &Value,
    ) -> Option<ValueId> {
        self.value_ids
            .get(&(model, attribute, value.dictionary_key()))
            .copied()
    }

    /// Record that row `row` of entity `entity` holds `value` for `attribute`.
    pub fn link(
        &mut self,
        model: ModelId,
        entity: EntityId,
        attribute: AttributeId,
        row: RowId,
        value: Value,
    ) {
        let value_id = self.value_id(model, attribute, &value);
        self.atoms
            .entry((model, attribute, entity, value_id))
            .or_insert_with(|| Atom {
                value,
                rows: BTreeSet::new(),
            })
            .rows
            .insert(row);
        self.states
            .entry((model, entity, attribute, value_id))
            .or_default()
            .rows
            .insert(row);
    }

    /// Dictionary rows of a scope, in value id order.
    pub fn scoped_atoms<'a>(
        &'a self,
        scope: &AttributeScope,
    ) -> impl Iterator<Item = ScopedAtom<'a>> + use<'a> {
        let owner = scope.owner_filter();
        self.atoms
            .range(
                (scope.model, scope.attribute, EntityId::MIN, ValueId::MIN)
                    ..=(scope.model, scope.attribute, EntityId::MAX, ValueId::MAX),
            )
            .filter(move |((_, _, hb2, _), _)| owner.is_none_or(|o| o == *hb2))
            .map(|((_, _, hb2, ha1), atom)| ScopedAtom {
                owner: *hb2,
                value_id: *ha1,
                atom,
            })
    }

    /// Dictionary rows of every attribute held by an entity's rows.
    pub fn entity_atoms(
        &self,
        model: ModelId,
        entity: EntityId,
    ) -> impl Iterator<Item = (AttributeId, ValueId, &Atom)> {
        self.atoms
            .iter()
            .filter(move |((m, _, hb2, _), _)| *m == model && *hb2 == entity)
            .map(|((_, ha2, _, ha1), atom)| (*ha2, *ha1, atom))
    }

    /// States rows of one entity.
    pub fn entity_states(
        &self,
        model: ModelId,
        entity: EntityId,
    ) -> impl Iterator<Item = (AttributeId, ValueId, &StateRow)> {
        self.states
            .range(
                (model, entity, AttributeId::MIN, ValueId::MIN)
                    ..=(model, entity, AttributeId::MAX, ValueId::MAX),
            )
            .map(|((_, _, ha2, ha1), row)| (*ha2, *ha1, row))
    }

    /// Rows of a memory table.
    pub fn table(&self, name: &str, query_id: &str) -> LensResult<&BTreeSet<u32>> {
        self.tables.get(name).ok_or_else(|| missing_table(name, query_id))
    }

    /// Whether a table or view of that name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.views.contains(name)
    }
}

/// The store's error for a reference to an unknown table.
pub(super) fn missing_table(name: &str, query_id: &str) -> LensError {
    LensError::execution(
        query_id,
        format!("Code: 60. DB::Exception: Table default.{name} doesn't exist."),
    )
}
