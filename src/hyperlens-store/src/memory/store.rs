//! `MemoryStore` implementation.

use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common_error::{LensError, LensResult};
use hyperlens_core::{AttributeId, AttributeKey, EntityKey, RowId, Value, ValueId};

use super::eval::Evaluator;
use super::state::MemoryState;
use crate::query::{Query, Statement};
use crate::result::{QueryStats, ResultSet};
use crate::store::ColumnarStore;

// ============================================================================
// StateSnapshot
// ============================================================================

/// One states row as seen by tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub attribute: AttributeId,
    pub value_id: ValueId,
    /// Rows of the current extension referencing the value.
    pub count: usize,
    pub pos: u8,
    pub sel: u8,
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory columnar store.
///
/// All state lives behind one `RwLock`: reads share it, statements take it
/// exclusively, so each statement is applied atomically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one row of an entity. `Null` values are not linked.
    pub async fn insert_row(
        &self,
        entity: EntityKey,
        row: RowId,
        values: &[(AttributeKey, Value)],
    ) -> LensResult<()> {
        if let Some((key, _)) = values.iter().find(|(key, _)| key.model != entity.model) {
            return Err(LensError::invalid_parameter(format!(
                "attribute {key} does not belong to the data model of entity {entity}"
            )));
        }
        let mut state = self.state.write().await;
        for (key, value) in values {
            if value.is_null() {
                continue;
            }
            state.link(entity.model, entity.entity, key.attribute, row, value.clone());
        }
        Ok(())
    }

    /// Rows of a memory table, if it exists.
    pub async fn table_rows(&self, name: &str) -> Option<Vec<u32>> {
        let state = self.state.read().await;
        state.tables.get(name).map(|rows| rows.iter().copied().collect())
    }

    /// Whether a view of that name exists.
    pub async fn has_view(&self, name: &str) -> bool {
        self.state.read().await.views.contains(name)
    }

    /// Whether a table or view of that name exists.
    pub async fn exists(&self, name: &str) -> bool {
        self.state.read().await.exists(name)
    }

    /// Value id of a loaded value.
    pub async fn value_id(&self, attribute: AttributeKey, value: &Value) -> Option<ValueId> {
        self.state
            .read()
            .await
            .lookup_value_id(attribute.model, attribute.attribute, value)
    }

    /// States rows of one entity, in `(attribute, value id)` order.
    pub async fn states(&self, entity: EntityKey) -> Vec<StateSnapshot> {
        let state = self.state.read().await;
        state
            .entity_states(entity.model, entity.entity)
            .map(|(attribute, value_id, row)| StateSnapshot {
                attribute,
                value_id,
                count: row.rows.len(),
                pos: row.pos,
                sel: row.sel,
            })
            .collect()
    }

    fn apply(
        state: &mut MemoryState,
        statement: &Statement,
        query_id: &str,
    ) -> LensResult<(u64, u64)> {
        match statement {
            Statement::DropTable { name } => {
                let dropped = state.tables.remove(name).is_some() | state.views.remove(name);
                Ok((u64::from(dropped), 0))
            }
            Statement::CreateMemoryTable { name, .. } => {
                if state.exists(name) {
                    return Err(LensError::execution(
                        query_id,
                        format!("Code: 57. DB::Exception: Table default.{name} already exists."),
                    ));
                }
                state.tables.insert(name.clone(), BTreeSet::new());
                Ok((0, 0))
            }
            Statement::InsertInto { table, source } => {
                let (rows, scanned) = {
                    let mut eval = Evaluator::new(state, query_id);
                    eval.require_table(table)?;
                    let result = eval.run(source)?.finish(QueryStats::new(query_id))?;
                    let first = result.column_names().into_iter().next().ok_or_else(|| {
                        LensError::execution(query_id, "insert source has no columns")
                    })?;
                    (result.u32_column(&first)?, eval.scanned)
                };
                let inserted = rows.len() as u64;
                if let Some(target) = state.tables.get_mut(table) {
                    target.extend(rows);
                }
                Ok((inserted, scanned))
            }
            Statement::ClearStates { entity, attributes } => {
                let mut cleared = 0;
                for ((m, hb2, ha2, _), row) in state.states.iter_mut() {
                    if *m == entity.model && *hb2 == entity.entity && attributes.contains(ha2) {
                        row.clear();
                        cleared += 1;
                    }
                }
                Ok((cleared, cleared))
            }
            Statement::RefreshPositions {
                entity,
                rows_table,
                view,
            } => {
                let updates: Vec<_> = {
                    let rows = state.table(rows_table, query_id)?;
                    state
                        .entity_atoms(entity.model, entity.entity)
                        .filter_map(|(ha2, ha1, atom)| {
                            let reachable: BTreeSet<RowId> =
                                atom.rows.intersection(rows).copied().collect();
                            (!reachable.is_empty()).then_some((ha2, ha1, reachable))
                        })
                        .collect()
                };
                let scanned = updates.len() as u64;
                for (ha2, ha1, reachable) in updates {
                    let row = state
                        .states
                        .entry((entity.model, entity.entity, ha2, ha1))
                        .or_default();
                    row.rows = reachable;
                    row.pos = 1;
                    row.sel = 0;
                }
                state.views.insert(view.clone());
                Ok((scanned, scanned))
            }
            Statement::MarkSelected {
                entity,
                view,
                selections,
            } => {
                let (marks, scanned) = {
                    let mut eval = Evaluator::new(state, query_id);
                    let mut marks = Vec::new();
                    for selection in selections {
                        for ha1 in eval.selected_values(selection)? {
                            marks.push((selection.scope.attribute, ha1));
                        }
                    }
                    (marks, eval.scanned)
                };
                let mut marked = 0;
                for (ha2, ha1) in marks {
                    if let Some(row) = state
                        .states
                        .get_mut(&(entity.model, entity.entity, ha2, ha1))
                    {
                        row.sel = u8::from(row.pos == 1);
                        marked += 1;
                    }
                }
                state.views.insert(view.clone());
                Ok((marked, scanned))
            }
            Statement::ResetStates { model } => {
                let mut cleared = 0;
                for ((m, ..), row) in state.states.iter_mut() {
                    if m == model {
                        row.clear();
                        cleared += 1;
                    }
                }
                Ok((cleared, cleared))
            }
        }
    }
}

#[async_trait]
impl ColumnarStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn query(&self, query: &Query, query_id: &str) -> LensResult<ResultSet> {
        let started = Instant::now();
        let state = self.state.read().await;
        let mut eval = Evaluator::new(&state, query_id);
        let builder = eval.run(query)?;
        let stats = QueryStats {
            elapsed: started.elapsed(),
            rows_read: eval.scanned,
            ..QueryStats::new(query_id)
        };
        log::debug!("memory query {query_id}: {} rows read", stats.rows_read);
        builder.finish(stats)
    }

    async fn execute(&self, statement: &Statement, query_id: &str) -> LensResult<QueryStats> {
        let started = Instant::now();
        let mut state = self.state.write().await;
        let (rows, rows_read) = Self::apply(&mut state, statement, query_id)?;
        log::debug!("memory statement {query_id}: {rows} rows written");
        Ok(QueryStats {
            elapsed: started.elapsed(),
            rows,
            rows_read,
            ..QueryStats::new(query_id)
        })
    }
}
