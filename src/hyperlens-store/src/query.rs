//! Store query IR.
//!
//! The engine never emits query text. It builds [`Query`] and [`Statement`]
//! values that each store backend interprets: the memory store evaluates
//! them directly and the SQL store renders them for ClickHouse.

use std::fmt;

use serde::{Deserialize, Serialize};

use hyperlens_core::{
    Attribute, AttributeId, AttributeKey, EntityId, EntityKey, ModelId, ValueType,
};

use crate::predicate::Predicate;

/// The dictionary rows of one attribute, as seen from one owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeScope {
    pub model: ModelId,
    pub attribute: AttributeId,
    pub value_type: ValueType,
    /// Owning entity in context.
    pub owner: EntityId,
    /// Junction attributes are restricted to `owner`'s rows.
    pub junction: bool,
}

impl AttributeScope {
    /// Scope of `attribute` as owned by `owner`.
    pub fn new(attribute: &Attribute, owner: EntityKey) -> Self {
        Self {
            model: attribute.key.model,
            attribute: attribute.key.attribute,
            value_type: attribute.value_type,
            owner: owner.entity,
            junction: attribute.junction,
        }
    }

    /// Attribute key.
    pub const fn key(&self) -> AttributeKey {
        AttributeKey::new(self.model, self.attribute)
    }

    /// Owning entity key.
    pub const fn owner_key(&self) -> EntityKey {
        EntityKey::new(self.model, self.owner)
    }

    /// Owner restriction applied to dictionary reads.
    pub const fn owner_filter(&self) -> Option<EntityId> {
        if self.junction { Some(self.owner) } else { None }
    }
}

/// What a count counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Distinct domain values.
    Set,
    /// Value references (rows referencing a value).
    Bag,
    /// Rows of the entity extension.
    Val,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Bag => "bag",
            Self::Val => "val",
        };
        write!(f, "{name}")
    }
}

/// Which hyperatom table a projection reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomSource {
    /// `HAtom_{m}`: every value with its full row list.
    Atoms,
    /// `HAtom_{m}States`: values with filter flags.
    States,
}

/// A projection column (`Over` vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    /// `$2`: attribute id.
    AttributeId,
    /// `$1`: value id.
    ValueId,
    /// `$k`: `[ha2, ha1]`.
    Key,
    /// `$fk`: `[model, ha2, ha1]`.
    FullKey,
    /// `$v`: value.
    Value,
    /// `$c`: frequency.
    Count,
    /// `$s`: selected flag.
    Selected,
    /// `$p`: position flag.
    Position,
    /// `$hb`: owning entity id.
    RowOwner,
    /// `$hl`: owning row list.
    RowList,
}

impl Column {
    /// Parse a projection token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "$2" => Some(Self::AttributeId),
            "$1" => Some(Self::ValueId),
            "$k" => Some(Self::Key),
            "$fk" => Some(Self::FullKey),
            "$v" => Some(Self::Value),
            "$c" => Some(Self::Count),
            "$s" => Some(Self::Selected),
            "$p" => Some(Self::Position),
            "$hb" => Some(Self::RowOwner),
            "$hl" => Some(Self::RowList),
            _ => None,
        }
    }

    /// Result column name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AttributeId => "ha2",
            Self::ValueId => "ha1",
            Self::Key | Self::FullKey => "hatom",
            Self::Value => "val",
            Self::Count => "cnt",
            Self::Selected => "sel",
            Self::Position => "pos",
            Self::RowOwner => "hb2",
            Self::RowList => "hb1arr",
        }
    }

    /// Whether the column only exists on the states table.
    pub const fn needs_states(&self) -> bool {
        matches!(self, Self::Selected | Self::Position)
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: Column,
    pub descending: bool,
}

/// A value projection joined with its dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub scope: AttributeScope,
    pub columns: Vec<Column>,
    pub source: AtomSource,
    /// `Some(true)`: only `pos=0`, `Some(false)`: only `pos=1`.
    pub excluded: Option<bool>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderKey>,
    /// `(limit, offset)`.
    pub limit: Option<(u64, u64)>,
}

/// Rows of an entity whose value of one attribute satisfies a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub scope: AttributeScope,
    pub predicate: Option<Predicate>,
}

/// Union of selections, optionally restricted to the rows of a memory table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSelection {
    pub selections: Vec<Selection>,
    pub within: Option<String>,
}

/// Where an entity's row count comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowSource {
    /// Size of a row-set memory table.
    Table(String),
    /// Distinct rows in the incidence table; `exact` picks exact over estimated.
    Links { exact: bool },
}

/// Aggregate over dictionary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Sum,
    Avg,
}

impl AggregateFn {
    /// Result column name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
        }
    }
}

/// A read query returning a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Scalar count over one attribute; `total` drops the attribute restriction.
    CollectionCount {
        scope: AttributeScope,
        kind: CollectionKind,
        filtered: bool,
        total: bool,
        /// Restricts the counted values; ignored for totals.
        predicate: Option<Predicate>,
        /// Current row set, for filtered `val` counts.
        rows_table: Option<String>,
    },
    /// Per-attribute counts of one entity (`ha2`, `cnt`).
    AttributeCounts {
        entity: EntityKey,
        kind: CollectionKind,
        filtered: bool,
        rows_table: Option<String>,
    },
    /// Row count of one entity.
    RowCount {
        entity: EntityKey,
        source: RowSource,
    },
    /// Sum or average of an attribute's values.
    Aggregate {
        scope: AttributeScope,
        func: AggregateFn,
        predicate: Option<Predicate>,
    },
    Project(Projection),
    /// Row ids (`hb1`) matching a row selection.
    SelectRows(RowSelection),
    /// Whether a table or view exists.
    TableExists { name: String },
}

impl Query {
    /// Entity whose data the query reads, if it is bound to one.
    pub fn target(&self) -> Option<EntityKey> {
        match self {
            Self::CollectionCount { scope, .. } | Self::Aggregate { scope, .. } => {
                Some(scope.owner_key())
            }
            Self::AttributeCounts { entity, .. } | Self::RowCount { entity, .. } => Some(*entity),
            Self::Project(p) => Some(p.scope.owner_key()),
            Self::SelectRows(rs) => rs.selections.first().map(|s| s.scope.owner_key()),
            Self::TableExists { .. } => None,
        }
    }
}

/// A write statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `DROP TABLE IF EXISTS`; also drops views.
    DropTable { name: String },
    /// Create a session-scoped single-column `UInt32` memory table.
    CreateMemoryTable { name: String, column: String },
    /// Insert the first column of a query's result into a memory table.
    InsertInto { table: String, source: Query },
    /// Reset row lists, counts and flags of an entity's state partitions.
    ClearStates {
        entity: EntityKey,
        attributes: Vec<AttributeId>,
    },
    /// Mark every value reachable from `rows_table` with `pos=1`, through `view`.
    RefreshPositions {
        entity: EntityKey,
        rows_table: String,
        view: String,
    },
    /// Set `sel` on values matching any of `selections`, through `view`.
    MarkSelected {
        entity: EntityKey,
        view: String,
        selections: Vec<Selection>,
    },
    /// Reset the states table of a whole data model.
    ResetStates { model: ModelId },
}

impl Statement {
    /// Entity the statement writes, if it is bound to one.
    pub fn target(&self) -> Option<EntityKey> {
        match self {
            Self::ClearStates { entity, .. }
            | Self::RefreshPositions { entity, .. }
            | Self::MarkSelected { entity, .. } => Some(*entity),
            Self::InsertInto { source, .. } => source.target(),
            Self::DropTable { .. } | Self::CreateMemoryTable { .. } | Self::ResetStates { .. } => {
                None
            }
        }
    }
}

/// A statement paired with the label it is logged and reported under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledStatement {
    pub label: String,
    pub statement: Statement,
}

impl LabeledStatement {
    /// Label a statement.
    pub fn new(label: impl Into<String>, statement: Statement) -> Self {
        Self {
            label: label.into(),
            statement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(junction: bool) -> AttributeScope {
        AttributeScope {
            model: 1,
            attribute: 4,
            value_type: ValueType::UInt32,
            owner: 2,
            junction,
        }
    }

    #[test]
    fn test_owner_filter_only_for_junctions() {
        assert_eq!(scope(true).owner_filter(), Some(2));
        assert_eq!(scope(false).owner_filter(), None);
        assert_eq!(scope(false).owner_key(), EntityKey::new(1, 2));
    }

    #[test]
    fn test_projection_tokens() {
        assert_eq!(Column::from_token("$fk"), Some(Column::FullKey));
        assert_eq!(Column::from_token("$x"), None);
        assert!(Column::Position.needs_states());
        assert!(!Column::Count.needs_states());
        assert_eq!(Column::RowList.name(), "hb1arr");
    }

    #[test]
    fn test_statement_targets() {
        let stmt = Statement::InsertInto {
            table: "FLT_1_2_MEM_X".to_string(),
            source: Query::SelectRows(RowSelection {
                selections: vec![Selection {
                    scope: scope(false),
                    predicate: None,
                }],
                within: None,
            }),
        };
        assert_eq!(stmt.target(), Some(EntityKey::new(1, 2)));
        assert_eq!(Statement::ResetStates { model: 1 }.target(), None);
    }
}
