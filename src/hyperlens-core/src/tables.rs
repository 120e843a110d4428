//! Physical table naming in the analytical store.

use serde::{Deserialize, Serialize};

use crate::meta::{EntityKey, ModelId};
use crate::types::ValueType;

/// Names of the shared tables of one data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableNames {
    model: ModelId,
}

impl TableNames {
    /// Table names of data model `model`.
    pub const fn new(model: ModelId) -> Self {
        Self { model }
    }

    /// Data model id.
    pub const fn model(&self) -> ModelId {
        self.model
    }

    /// Hyperatoms of every attribute, without values (`HAtom_{m}`).
    pub fn hatom(&self) -> String {
        format!("HAtom_{}", self.model)
    }

    /// Per-value filter state (`HAtom_{m}States`).
    pub fn hatom_states(&self) -> String {
        format!("HAtom_{}States", self.model)
    }

    /// Hyperatom-to-hyperbond incidence (`HLink_{m}`).
    pub fn hlink(&self) -> String {
        format!("HLink_{}", self.model)
    }

    /// Value dictionary for one value type (`HAtom_{m}_{type}`).
    pub fn dictionary(&self, value_type: ValueType) -> String {
        format!("HAtom_{}_{}", self.model, value_type.storage_type())
    }
}

/// Names of the per-entity filter tables (`FLT_{m}_{e}_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTables {
    prefix: String,
}

impl FilterTables {
    /// Filter tables of `entity`.
    pub fn new(entity: EntityKey) -> Self {
        Self {
            prefix: format!("FLT_{}_{}", entity.model, entity.entity),
        }
    }

    /// View of the values reachable from the current row set.
    pub fn positions_view(&self) -> String {
        format!("{}_VW_pos", self.prefix)
    }

    /// View of the values matching the triggering selections.
    pub fn selections_view(&self) -> String {
        format!("{}_VW_sel", self.prefix)
    }

    /// First row-set buffer.
    pub fn buffer_x(&self) -> String {
        format!("{}_MEM_X", self.prefix)
    }

    /// Second row-set buffer.
    pub fn buffer_z(&self) -> String {
        format!("{}_MEM_Z", self.prefix)
    }

    /// Membership table of junction values used during propagation.
    pub fn junction_values(&self) -> String {
        format!("{}_MEM_ha1", self.prefix)
    }

    /// Every filter table of the entity.
    pub fn all(&self) -> Vec<String> {
        vec![
            self.buffer_x(),
            self.buffer_z(),
            self.junction_values(),
            self.positions_view(),
            self.selections_view(),
        ]
    }
}

/// Double-buffer pointers of an entity's row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPair {
    /// Current, readable row set.
    pub old_set: String,
    /// Buffer the next filter transition writes into.
    pub new_set: String,
}

impl BufferPair {
    /// Pointers of an unfiltered entity.
    pub fn initial(entity: EntityKey) -> Self {
        let tables = FilterTables::new(entity);
        Self {
            old_set: tables.buffer_z(),
            new_set: tables.buffer_x(),
        }
    }

    /// The pair with roles exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            old_set: self.new_set.clone(),
            new_set: self.old_set.clone(),
        }
    }

    /// Whether the two pointers name different buffers.
    pub fn is_distinct(&self) -> bool {
        self.old_set != self.new_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_table_names() {
        let names = TableNames::new(3);
        assert_eq!(names.hatom(), "HAtom_3");
        assert_eq!(names.hatom_states(), "HAtom_3States");
        assert_eq!(names.hlink(), "HLink_3");
        assert_eq!(names.dictionary(ValueType::Bool), "HAtom_3_UInt8");
        assert_eq!(names.dictionary(ValueType::String), "HAtom_3_String");
    }

    #[test]
    fn test_filter_table_names() {
        let tables = FilterTables::new(EntityKey::new(3, 7));
        assert_eq!(tables.positions_view(), "FLT_3_7_VW_pos");
        assert_eq!(tables.selections_view(), "FLT_3_7_VW_sel");
        assert_eq!(tables.junction_values(), "FLT_3_7_MEM_ha1");
        assert_eq!(tables.all().len(), 5);
    }

    #[test]
    fn test_buffer_pair_swap() {
        let pair = BufferPair::initial(EntityKey::new(1, 2));
        assert_eq!(pair.old_set, "FLT_1_2_MEM_Z");
        assert_eq!(pair.new_set, "FLT_1_2_MEM_X");
        let swapped = pair.swapped();
        assert!(swapped.is_distinct());
        assert_eq!(swapped.old_set, pair.new_set);
        assert_eq!(swapped.swapped(), pair);
    }
}
