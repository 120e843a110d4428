//! Query evaluation over [`MemoryState`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use common_error::{LensError, LensResult};
use hyperlens_core::{AttributeId, EntityId, EntityKey, RowId, Value, ValueId};

use super::state::{MemoryState, ScopedAtom, missing_table};
use crate::predicate::{CmpOp, Operand, Predicate, like_matches};
use crate::query::{
    AggregateFn, AtomSource, AttributeScope, CollectionKind, Column, Projection, Query,
    RowSelection, RowSource, Selection,
};
use crate::result::{ColumnType, ResultBuilder};

/// Evaluates queries against a locked state, labelling failures with `query_id`.
pub(super) struct Evaluator<'a> {
    state: &'a MemoryState,
    query_id: &'a str,
    /// Rows examined so far.
    pub scanned: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(state: &'a MemoryState, query_id: &'a str) -> Self {
        Self {
            state,
            query_id,
            scanned: 0,
        }
    }

    fn fail(&self, message: impl std::fmt::Display) -> LensError {
        LensError::execution(self.query_id, message)
    }

    pub fn run(&mut self, query: &Query) -> LensResult<ResultBuilder> {
        match query {
            Query::CollectionCount {
                scope,
                kind,
                filtered,
                total,
                predicate,
                rows_table,
            } => {
                let values: Option<BTreeSet<ValueId>> = match predicate {
                    Some(p) if !*total => Some(
                        self.matching_atoms(scope, Some(p))?
                            .into_iter()
                            .map(|s| s.value_id)
                            .collect(),
                    ),
                    _ => None,
                };
                let count = self.collection_count(
                    scope,
                    *kind,
                    *filtered,
                    *total,
                    values.as_ref(),
                    rows_table.as_deref(),
                )?;
                scalar("cnt", ColumnType::UInt64, Value::Int64(count))
            }
            Query::AttributeCounts {
                entity,
                kind,
                filtered,
                rows_table,
            } => self.attribute_counts(*entity, *kind, *filtered, rows_table.as_deref()),
            Query::RowCount { entity, source } => {
                let count = self.row_count(*entity, source)?;
                scalar("cnt", ColumnType::UInt64, Value::Int64(count))
            }
            Query::Aggregate {
                scope,
                func,
                predicate,
            } => {
                let value = self.aggregate(scope, *func, predicate.as_ref())?;
                scalar(func.name(), ColumnType::Float64, value)
            }
            Query::Project(projection) => self.project(projection),
            Query::SelectRows(selection) => {
                let rows = self.select_rows(selection)?;
                let mut builder = ResultBuilder::new().column("hb1", ColumnType::UInt32);
                for row in rows {
                    builder.push_row(vec![Value::from(row)])?;
                }
                Ok(builder)
            }
            Query::TableExists { name } => scalar(
                "result",
                ColumnType::UInt8,
                Value::Int64(i64::from(self.state.exists(name))),
            ),
        }
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    pub fn test(&self, predicate: &Predicate, value: &Value, value_id: ValueId) -> LensResult<bool> {
        let operand = |op: &Operand| match op {
            Operand::Value => value.clone(),
            Operand::ValueId => Value::from(value_id),
        };
        let result = match predicate {
            Predicate::Compare { operand: o, op, value: rhs } => {
                let lhs = operand(o);
                match lhs.compare(rhs) {
                    Some(ord) => compare_holds(*op, ord),
                    None if lhs.is_null() => false,
                    None => {
                        return Err(self.fail(format!(
                            "Code: 386. DB::Exception: There is no supertype for types {}, {}",
                            lhs.type_name(),
                            rhs.type_name()
                        )));
                    }
                }
            }
            Predicate::Between {
                operand: o,
                low,
                high,
                negated,
            } => {
                let v = operand(o);
                let inside = matches!(v.compare(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(v.compare(high), Some(Ordering::Less | Ordering::Equal));
                inside != *negated
            }
            Predicate::In {
                operand: o,
                values,
                negated,
            } => {
                let v = operand(o);
                values.iter().any(|candidate| v.matches(candidate)) != *negated
            }
            Predicate::Like {
                operand: o,
                pattern,
                negated,
            } => {
                let text = match operand(o) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                like_matches(&text, pattern) != *negated
            }
            Predicate::InTable {
                operand: o,
                table,
                negated,
            } => {
                let members = self.state.table(table, self.query_id)?;
                let found = operand(o).as_u32().is_some_and(|id| members.contains(&id));
                found != *negated
            }
            Predicate::IsTrue { operand: o } => match operand(o) {
                Value::Bool(b) => b,
                Value::Int64(i) => i != 0,
                Value::Float64(f) => f != 0.0,
                Value::Null => false,
                other => {
                    return Err(self.fail(format!(
                        "Code: 59. DB::Exception: Illegal type {} of column for filter",
                        other.type_name()
                    )));
                }
            },
            Predicate::And(l, r) => self.test(l, value, value_id)? && self.test(r, value, value_id)?,
            Predicate::Or(l, r) => self.test(l, value, value_id)? || self.test(r, value, value_id)?,
            Predicate::Not(inner) => !self.test(inner, value, value_id)?,
        };
        Ok(result)
    }

    fn matching_atoms(
        &mut self,
        scope: &AttributeScope,
        predicate: Option<&Predicate>,
    ) -> LensResult<Vec<ScopedAtom<'a>>> {
        let mut matched = Vec::new();
        for scoped in self.state.scoped_atoms(scope) {
            self.scanned += 1;
            let keep = match predicate {
                Some(p) => self.test(p, &scoped.atom.value, scoped.value_id)?,
                None => true,
            };
            if keep {
                matched.push(scoped);
            }
        }
        Ok(matched)
    }

    // ------------------------------------------------------------------
    // Counting
    // ------------------------------------------------------------------

    fn collection_count(
        &mut self,
        scope: &AttributeScope,
        kind: CollectionKind,
        filtered: bool,
        total: bool,
        values: Option<&BTreeSet<ValueId>>,
        rows_table: Option<&str>,
    ) -> LensResult<i64> {
        let owner = scope.owner_filter();
        let in_scope = |hb2: EntityId, ha2: AttributeId, ha1: ValueId| {
            total
                || (ha2 == scope.attribute
                    && owner.is_none_or(|o| o == hb2)
                    && values.is_none_or(|v| v.contains(&ha1)))
        };
        let count = match kind {
            CollectionKind::Set => self
                .state
                .states
                .iter()
                .filter(|((m, hb2, ha2, ha1), row)| {
                    *m == scope.model && in_scope(*hb2, *ha2, *ha1) && (!filtered || row.pos == 1)
                })
                .count(),
            CollectionKind::Bag if filtered => self
                .state
                .states
                .iter()
                .filter(|((m, hb2, ha2, ha1), row)| {
                    *m == scope.model && in_scope(*hb2, *ha2, *ha1) && row.pos == 1
                })
                .map(|(_, row)| row.rows.len())
                .sum::<usize>(),
            CollectionKind::Bag => self
                .state
                .atoms
                .iter()
                .filter(|((m, ha2, hb2, ha1), _)| *m == scope.model && in_scope(*hb2, *ha2, *ha1))
                .map(|(_, atom)| atom.rows.len())
                .sum::<usize>(),
            CollectionKind::Val => {
                let within = match (filtered, rows_table) {
                    (true, Some(table)) => Some(self.state.table(table, self.query_id)?),
                    (true, None) => {
                        return Err(self.fail("filtered row count needs the current row set"));
                    }
                    (false, _) => None,
                };
                let mut rows: BTreeSet<RowId> = BTreeSet::new();
                for ((m, ha2, hb2, ha1), atom) in &self.state.atoms {
                    let owned = *hb2 == scope.owner
                        && (total
                            || (*ha2 == scope.attribute
                                && values.is_none_or(|v| v.contains(ha1))));
                    if *m == scope.model && owned {
                        rows.extend(
                            atom.rows
                                .iter()
                                .filter(|r| within.is_none_or(|w| w.contains(*r))),
                        );
                    }
                }
                rows.len()
            }
        };
        self.scanned += count as u64;
        Ok(count as i64)
    }

    fn attribute_counts(
        &mut self,
        entity: EntityKey,
        kind: CollectionKind,
        filtered: bool,
        rows_table: Option<&str>,
    ) -> LensResult<ResultBuilder> {
        let mut counts: BTreeMap<AttributeId, u64> = BTreeMap::new();
        match (kind, filtered) {
            (CollectionKind::Set, true) => {
                for (ha2, _, row) in self.state.entity_states(entity.model, entity.entity) {
                    if row.pos == 1 {
                        *counts.entry(ha2).or_default() += 1;
                    }
                }
            }
            (CollectionKind::Set, false) => {
                for (ha2, _, _) in self.state.entity_atoms(entity.model, entity.entity) {
                    *counts.entry(ha2).or_default() += 1;
                }
            }
            (CollectionKind::Bag, true) => {
                let table = rows_table
                    .ok_or_else(|| self.fail("filtered bag counts need the current row set"))?;
                let within = self.state.table(table, self.query_id)?;
                for (ha2, _, atom) in self.state.entity_atoms(entity.model, entity.entity) {
                    let n = atom.rows.iter().filter(|r| within.contains(*r)).count() as u64;
                    if n > 0 {
                        *counts.entry(ha2).or_default() += n;
                    }
                }
            }
            (CollectionKind::Bag, false) => {
                for (ha2, _, atom) in self.state.entity_atoms(entity.model, entity.entity) {
                    *counts.entry(ha2).or_default() += atom.rows.len() as u64;
                }
            }
            (CollectionKind::Val, _) => {
                return Err(LensError::invalid_parameter(
                    "per-attribute counts are defined for set and bag collections",
                ));
            }
        }
        self.scanned += counts.values().sum::<u64>();
        let mut builder = ResultBuilder::new()
            .column("ha2", ColumnType::UInt16)
            .column("cnt", ColumnType::UInt64);
        for (ha2, cnt) in counts {
            builder.push_row(vec![Value::from(ha2), Value::Int64(cnt as i64)])?;
        }
        Ok(builder)
    }

    fn row_count(&mut self, entity: EntityKey, source: &RowSource) -> LensResult<i64> {
        let count = match source {
            RowSource::Table(name) => self.state.table(name, self.query_id)?.len(),
            RowSource::Links { .. } => self
                .state
                .entity_atoms(entity.model, entity.entity)
                .flat_map(|(_, _, atom)| atom.rows.iter().copied())
                .collect::<BTreeSet<RowId>>()
                .len(),
        };
        self.scanned += count as u64;
        Ok(count as i64)
    }

    fn aggregate(
        &mut self,
        scope: &AttributeScope,
        func: AggregateFn,
        predicate: Option<&Predicate>,
    ) -> LensResult<Value> {
        let atoms = self.matching_atoms(scope, predicate)?;
        let mut values = Vec::with_capacity(atoms.len());
        for scoped in &atoms {
            match &scoped.atom.value {
                Value::Null => {}
                v => values.push(v.as_float64().ok_or_else(|| {
                    self.fail(format!(
                        "Code: 43. DB::Exception: Illegal type {} of argument for aggregate function {}",
                        v.type_name(),
                        func.name()
                    ))
                })?),
            }
        }
        let sum: f64 = values.iter().sum();
        Ok(match func {
            AggregateFn::Sum => Value::Float64(sum),
            AggregateFn::Avg if values.is_empty() => Value::Null,
            AggregateFn::Avg => Value::Float64(sum / values.len() as f64),
        })
    }

    // ------------------------------------------------------------------
    // Projection and selection
    // ------------------------------------------------------------------

    fn project(&mut self, projection: &Projection) -> LensResult<ResultBuilder> {
        let scope = &projection.scope;
        if projection.source == AtomSource::Atoms {
            if let Some(col) = projection.columns.iter().find(|c| c.needs_states()) {
                return Err(self.fail(format!(
                    "Code: 47. DB::Exception: Missing columns: '{}'",
                    col.name()
                )));
            }
            if projection.excluded.is_some() {
                return Err(self.fail("Code: 47. DB::Exception: Missing columns: 'pos'"));
            }
        }

        let mut rows = Vec::new();
        for scoped in self.matching_atoms(scope, projection.predicate.as_ref())? {
            let row = match projection.source {
                AtomSource::Atoms => ProjectedRow {
                    owner: scoped.owner,
                    value_id: scoped.value_id,
                    value: scoped.atom.value.clone(),
                    rows: scoped.atom.rows.iter().copied().collect(),
                    pos: 0,
                    sel: 0,
                },
                AtomSource::States => {
                    let key = (scope.model, scoped.owner, scope.attribute, scoped.value_id);
                    let Some(state) = self.state.states.get(&key) else {
                        continue;
                    };
                    ProjectedRow {
                        owner: scoped.owner,
                        value_id: scoped.value_id,
                        value: scoped.atom.value.clone(),
                        rows: state.rows.iter().copied().collect(),
                        pos: state.pos,
                        sel: state.sel,
                    }
                }
            };
            let keep = match projection.excluded {
                Some(true) => row.pos == 0,
                Some(false) => row.pos == 1,
                None => true,
            };
            if keep {
                rows.push(row);
            }
        }

        if !projection.order.is_empty() {
            rows.sort_by(|a, b| {
                for key in &projection.order {
                    let ord = a.cell(key.column, scope).sort_cmp(&b.cell(key.column, scope));
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let (limit, offset) = projection.limit.unwrap_or((u64::MAX, 0));
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let mut builder = projection
            .columns
            .iter()
            .fold(ResultBuilder::new(), |b, col| {
                b.column(col.name(), column_type(*col, scope))
            });
        for row in rows.iter().skip(offset).take(limit) {
            builder.push_row(
                projection
                    .columns
                    .iter()
                    .map(|col| row.cell(*col, scope))
                    .collect(),
            )?;
        }
        Ok(builder)
    }

    fn selection_rows(&mut self, selection: &Selection) -> LensResult<BTreeSet<RowId>> {
        let mut rows = BTreeSet::new();
        for scoped in self.matching_atoms(&selection.scope, selection.predicate.as_ref())? {
            rows.extend(scoped.atom.rows.iter().copied());
        }
        Ok(rows)
    }

    pub fn select_rows(&mut self, selection: &RowSelection) -> LensResult<BTreeSet<RowId>> {
        let mut rows = BTreeSet::new();
        for s in &selection.selections {
            rows.extend(self.selection_rows(s)?);
        }
        if let Some(table) = &selection.within {
            let within = self.state.table(table, self.query_id)?;
            rows.retain(|r| within.contains(r));
        }
        Ok(rows)
    }

    /// Value ids of `selection`'s matches, for marking `sel` flags.
    pub fn selected_values(&mut self, selection: &Selection) -> LensResult<Vec<ValueId>> {
        Ok(self
            .matching_atoms(&selection.scope, selection.predicate.as_ref())?
            .into_iter()
            .map(|s| s.value_id)
            .collect())
    }

    /// Check that every memory table a statement will read exists.
    pub fn require_table(&self, name: &str) -> LensResult<()> {
        if self.state.tables.contains_key(name) {
            Ok(())
        } else {
            Err(missing_table(name, self.query_id))
        }
    }
}

struct ProjectedRow {
    owner: EntityId,
    value_id: ValueId,
    value: Value,
    rows: Vec<RowId>,
    pos: u8,
    sel: u8,
}

impl ProjectedRow {
    fn cell(&self, column: Column, scope: &AttributeScope) -> Value {
        match column {
            Column::AttributeId => Value::from(scope.attribute),
            Column::ValueId => Value::from(self.value_id),
            Column::Key => Value::Array(vec![
                Value::from(scope.attribute),
                Value::from(self.value_id),
            ]),
            Column::FullKey => Value::Array(vec![
                Value::from(scope.model),
                Value::from(scope.attribute),
                Value::from(self.value_id),
            ]),
            Column::Value => self.value.clone(),
            Column::Count => Value::Int64(self.rows.len() as i64),
            Column::Selected => Value::Int64(i64::from(self.sel)),
            Column::Position => Value::Int64(i64::from(self.pos)),
            Column::RowOwner => Value::from(self.owner),
            Column::RowList => Value::Array(self.rows.iter().map(|r| Value::from(*r)).collect()),
        }
    }
}

fn column_type(column: Column, scope: &AttributeScope) -> ColumnType {
    match column {
        Column::AttributeId | Column::RowOwner => ColumnType::UInt16,
        Column::ValueId | Column::Count => ColumnType::UInt32,
        Column::Key | Column::FullKey | Column::RowList => ColumnType::UInt32List,
        Column::Value => ColumnType::for_value_type(scope.value_type),
        Column::Selected | Column::Position => ColumnType::UInt8,
    }
}

fn compare_holds(op: CmpOp, ord: Ordering) -> bool {
    match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::NotEq => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::LtEq => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::GtEq => ord != Ordering::Less,
    }
}

fn scalar(name: &str, column_type: ColumnType, value: Value) -> LensResult<ResultBuilder> {
    let mut builder = ResultBuilder::new().column(name, column_type);
    builder.push_row(vec![value])?;
    Ok(builder)
}
