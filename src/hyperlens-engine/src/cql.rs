//! Generative query builder over one attribute's values.
//!
//! Every chain method takes `&self` and returns a new builder, so a prefix
//! can be reused to derive several queries:
//!
//! ```rust,ignore
//! let base = collection.query().select().where_("$v")?;
//! let brazil = base.in_(vec![Value::from("Brazil")])?;
//! let south = base.in_(vec![Value::from("Brazil"), Value::from("Argentina")])?;
//! ```

use std::sync::Arc;

use common_error::{LensError, LensResult, ensure, operation_err};
use hyperlens_core::Value;
use hyperlens_store::{
    AggregateFn, AtomSource, AttributeScope, CmpOp, CollectionKind, Column, ColumnarStore,
    Operand, OrderKey, Predicate, Projection, Query, ResultSet, RowSelection, Selection,
};

use crate::selection::SelectionDescriptor;

// ============================================================================
// Builder state
// ============================================================================

/// The operation a builder assembles.
#[derive(Debug, Clone, PartialEq)]
enum Operation {
    None,
    Count {
        kind: CollectionKind,
        filtered: bool,
        total: bool,
    },
    Over {
        columns: Vec<Column>,
        source: AtomSource,
        excluded: Option<bool>,
    },
    Select,
    Aggregate(AggregateFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    Replace,
    And,
    Or,
}

/// An operand waiting for `between`, `in_`, `in_table` or `like`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    operand: Operand,
    connective: Connective,
    negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct BuilderState {
    scope: AttributeScope,
    alias: String,
    /// Whether the bound collection was filtered when the builder was made.
    filtered: bool,
    /// Current row set of the owning entity, when filtered.
    rows_table: Option<String>,
    operation: Operation,
    predicate: Option<Predicate>,
    pending: Option<Pending>,
    negate_next: bool,
    order: Vec<OrderKey>,
    limit: Option<(u64, u64)>,
}

/// A parsed `where_` condition.
enum Condition {
    Operand(Operand),
    Complete(Predicate),
}

// ============================================================================
// QueryBuilder
// ============================================================================

/// Immutable builder of store queries over one attribute.
///
/// Obtained from [`AttributeValueCollection::query`](crate::AttributeValueCollection::query).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    store: Arc<dyn ColumnarStore>,
    state: BuilderState,
}

impl PartialEq for QueryBuilder {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl QueryBuilder {
    /// Bind a builder to an attribute scope.
    pub fn new(
        store: Arc<dyn ColumnarStore>,
        scope: AttributeScope,
        alias: impl Into<String>,
        filtered: bool,
        rows_table: Option<String>,
    ) -> Self {
        Self {
            store,
            state: BuilderState {
                scope,
                alias: alias.into(),
                filtered,
                rows_table,
                operation: Operation::None,
                predicate: None,
                pending: None,
                negate_next: false,
                order: Vec::new(),
                limit: None,
            },
        }
    }

    fn with(&self, change: impl FnOnce(&mut BuilderState)) -> Self {
        let mut next = self.clone();
        change(&mut next.state);
        next
    }

    fn try_with(
        &self,
        change: impl FnOnce(&mut BuilderState) -> LensResult<()>,
    ) -> LensResult<Self> {
        let mut next = self.clone();
        change(&mut next.state)?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Scope the builder reads.
    pub fn scope(&self) -> &AttributeScope {
        &self.state.scope
    }

    /// Alias of the bound attribute.
    pub fn alias(&self) -> &str {
        &self.state.alias
    }

    /// Whether the bound collection was filtered.
    pub fn is_filtered(&self) -> bool {
        self.state.filtered
    }

    /// Accumulated predicate, with a dangling operand read as a flag.
    ///
    /// A dangling operand that cannot be a flag is left out; [`build`](Self::build)
    /// and [`selection`](Self::selection) reject it.
    pub fn predicate(&self) -> Option<Predicate> {
        self.settled_predicate()
            .unwrap_or_else(|_| self.state.predicate.clone())
    }

    fn settled_predicate(&self) -> LensResult<Option<Predicate>> {
        let mut state = self.state.clone();
        settle(&mut state)?;
        Ok(state.predicate)
    }

    /// Label the query is logged and reported under.
    pub fn query_id(&self) -> &'static str {
        match &self.state.operation {
            Operation::None => "Query",
            Operation::Count { .. } => "Counting",
            Operation::Over { .. } => "Projection",
            Operation::Select => "Selection",
            Operation::Aggregate(AggregateFn::Sum) => "Sum",
            Operation::Aggregate(AggregateFn::Avg) => "Average",
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Count distinct values (`set`), value references (`bag`) or rows (`val`).
    pub fn count(&self, kind: CollectionKind, filtered: bool, total: bool) -> Self {
        self.with(|s| {
            s.operation = Operation::Count {
                kind,
                filtered,
                total,
            }
        })
    }

    /// Project the comma-separated `tokens`.
    ///
    /// `unfiltered` reads the plain hyperatom table even when the collection
    /// is filtered. `excluded` keeps only `pos=0` (`Some(true)`) or `pos=1`
    /// (`Some(false)`) values and needs a filtered read, as do `$s` and `$p`.
    pub fn over(&self, tokens: &str, unfiltered: bool, excluded: Option<bool>) -> LensResult<Self> {
        let columns = parse_columns(tokens)?;
        let states = self.state.filtered && !unfiltered;
        if let Some(col) = columns.iter().find(|c| c.needs_states()) {
            ensure!(
                states,
                Operation: "projection token for `{}` needs a filtered collection",
                col.name()
            );
        }
        ensure!(
            states || excluded.is_none(),
            "excluded values are only defined for a filtered collection"
        );
        let source = if states {
            AtomSource::States
        } else {
            AtomSource::Atoms
        };
        Ok(self.with(|s| {
            s.operation = Operation::Over {
                columns,
                source,
                excluded,
            }
        }))
    }

    /// Select the rows whose value satisfies the predicate built next.
    pub fn select(&self) -> Self {
        self.with(|s| s.operation = Operation::Select)
    }

    /// Sum of the values satisfying the predicate.
    pub fn sum(&self) -> Self {
        self.with(|s| s.operation = Operation::Aggregate(AggregateFn::Sum))
    }

    /// Average of the values satisfying the predicate.
    pub fn average(&self) -> Self {
        self.with(|s| s.operation = Operation::Aggregate(AggregateFn::Avg))
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Start a predicate: `$v`, `$1`, or `$v|$1 <op> literal`.
    pub fn where_(&self, cond: &str) -> LensResult<Self> {
        self.condition(cond, Connective::Replace)
    }

    /// Conjoin a condition with the predicate so far.
    pub fn and_(&self, cond: &str) -> LensResult<Self> {
        self.condition(cond, Connective::And)
    }

    /// Disjoin a condition with the predicate so far.
    pub fn or_(&self, cond: &str) -> LensResult<Self> {
        self.condition(cond, Connective::Or)
    }

    /// Negate the next condition.
    pub fn not(&self) -> Self {
        self.with(|s| s.negate_next = !s.negate_next)
    }

    fn condition(&self, cond: &str, connective: Connective) -> LensResult<Self> {
        let parsed = parse_condition(cond, &self.state.scope)?;
        self.try_with(|s| {
            settle(s)?;
            if connective != Connective::Replace && s.predicate.is_none() {
                operation_err!("`{cond}` joined to an empty predicate; start with where_");
            }
            let negated = std::mem::take(&mut s.negate_next);
            match parsed {
                Condition::Operand(operand) => {
                    s.pending = Some(Pending {
                        operand,
                        connective,
                        negated,
                    });
                }
                Condition::Complete(p) => {
                    let p = if negated { p.negate() } else { p };
                    combine(s, connective, p);
                }
            }
            Ok(())
        })
    }

    fn complete(
        &self,
        what: &str,
        make: impl FnOnce(Operand, bool) -> Predicate,
    ) -> LensResult<Self> {
        self.try_with(|s| {
            let Some(pending) = s.pending.take() else {
                operation_err!("`{what}` needs an operand; call where_(\"$v\") first");
            };
            let negated = pending.negated ^ std::mem::take(&mut s.negate_next);
            combine(s, pending.connective, make(pending.operand, negated));
            Ok(())
        })
    }

    /// Complete the pending operand with `BETWEEN low AND high`.
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> LensResult<Self> {
        let (low, high) = (low.into(), high.into());
        ensure!(
            !low.is_null() && !high.is_null(),
            "`between` needs two non-null operands"
        );
        self.complete("between", |operand, negated| Predicate::Between {
            operand,
            low,
            high,
            negated,
        })
    }

    /// Complete the pending operand with `IN (values)`.
    pub fn in_(&self, values: Vec<Value>) -> LensResult<Self> {
        ensure!(!values.is_empty(), "`in` needs at least one operand");
        self.complete("in", |operand, negated| Predicate::In {
            operand,
            values,
            negated,
        })
    }

    /// Complete the pending operand with membership in a memory table.
    pub fn in_table(&self, table: &str) -> LensResult<Self> {
        ensure!(!table.trim().is_empty(), "`in_table` needs a table name");
        let table = table.trim().to_string();
        self.complete("in_table", |operand, negated| Predicate::InTable {
            operand,
            table,
            negated,
        })
    }

    /// Complete the pending operand with `LIKE pattern`.
    pub fn like(&self, pattern: &str) -> LensResult<Self> {
        let pattern = pattern.to_string();
        self.complete("like", |operand, negated| Predicate::Like {
            operand,
            pattern,
            negated,
        })
    }

    /// Replace the predicate outright.
    pub fn with_predicate(&self, predicate: Option<Predicate>) -> Self {
        self.with(|s| {
            s.pending = None;
            s.negate_next = false;
            s.predicate = predicate;
        })
    }

    // ------------------------------------------------------------------
    // Ordering and paging
    // ------------------------------------------------------------------

    /// Order by a list such as `"$c DESC, $v"`.
    pub fn order(&self, spec: &str) -> LensResult<Self> {
        let mut keys = Vec::new();
        for item in spec.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let mut parts = item.split_whitespace();
            let token = parts.next().unwrap_or_default();
            let column = match token {
                "$k" | "$v" | "$c" | "$p" | "$s" | "$1" | "$2" => Column::from_token(token),
                _ => None,
            }
            .ok_or_else(|| LensError::operation(format!("cannot order by `{token}`")))?;
            let descending = match parts.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => false,
                Some("DESC") => true,
                Some(other) => operation_err!("unknown sort direction `{other}`"),
            };
            ensure!(
                parts.next().is_none(),
                Operation: "cannot parse order item `{item}`"
            );
            keys.push(OrderKey { column, descending });
        }
        ensure!(!keys.is_empty(), "empty order list");
        Ok(self.with(|s| s.order = keys))
    }

    /// Keep at most `limit` rows after skipping `offset`.
    pub fn limit(&self, limit: u64, offset: u64) -> Self {
        self.with(|s| s.limit = Some((limit, offset)))
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    /// Assemble the query without running it.
    pub fn build(&self) -> LensResult<Query> {
        let state = &self.state;
        let predicate = self.settled_predicate()?;
        match &state.operation {
            Operation::None => {
                operation_err!("no operation; call count, over, select, sum or average first")
            }
            Operation::Count {
                kind,
                filtered,
                total,
            } => {
                ensure!(
                    !*filtered || state.filtered,
                    "filtered counts need a filtered collection"
                );
                ensure!(
                    !*total || predicate.is_none(),
                    "total counts cannot be restricted by a predicate"
                );
                let rows_table = if *filtered && *kind == CollectionKind::Val {
                    Some(state.rows_table.clone().ok_or_else(|| {
                        LensError::state("filtered row count without a current row set")
                    })?)
                } else {
                    None
                };
                Ok(Query::CollectionCount {
                    scope: state.scope.clone(),
                    kind: *kind,
                    filtered: *filtered,
                    total: *total,
                    predicate,
                    rows_table,
                })
            }
            Operation::Over {
                columns,
                source,
                excluded,
            } => {
                if let Some(key) = state.order.iter().find(|k| k.column.needs_states()) {
                    ensure!(
                        *source == AtomSource::States,
                        Operation: "ordering by `{}` needs a filtered projection",
                        key.column.name()
                    );
                }
                Ok(Query::Project(Projection {
                    scope: state.scope.clone(),
                    columns: columns.clone(),
                    source: *source,
                    excluded: *excluded,
                    predicate,
                    order: state.order.clone(),
                    limit: state.limit,
                }))
            }
            Operation::Select => Ok(Query::SelectRows(RowSelection {
                selections: vec![self.selection()?],
                within: None,
            })),
            Operation::Aggregate(func) => Ok(Query::Aggregate {
                scope: state.scope.clone(),
                func: *func,
                predicate,
            }),
        }
    }

    /// The selection a `select` builder describes.
    pub fn selection(&self) -> LensResult<Selection> {
        ensure!(
            self.state.operation == Operation::Select,
            "only a select builder describes a selection"
        );
        Ok(Selection {
            scope: self.state.scope.clone(),
            predicate: self.settled_predicate()?,
        })
    }

    /// Serializable descriptor of a `select` builder.
    pub fn descriptor(&self) -> LensResult<SelectionDescriptor> {
        let selection = self.selection()?;
        Ok(SelectionDescriptor::new(
            selection.scope,
            self.state.alias.clone(),
            selection.predicate,
        ))
    }

    /// Build and run the query.
    pub async fn exe(&self) -> LensResult<ResultSet> {
        let query = self.build()?;
        let query_id = self.query_id();
        log::debug!("{query_id} over `{}`", self.state.alias);
        self.store.query(&query, query_id).await
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Turn a dangling operand into a flag test.
///
/// Only value ids and numeric or boolean values can be read as flags.
fn settle(state: &mut BuilderState) -> LensResult<()> {
    if let Some(pending) = state.pending.take() {
        ensure!(
            pending.operand == Operand::ValueId || state.scope.value_type.is_numeric(),
            Operation: "`{}` values of type {} cannot be a flag; complete `$v` with in_, between, like or in_table",
            state.alias,
            state.scope.value_type
        );
        let p = Predicate::IsTrue {
            operand: pending.operand,
        };
        let p = if pending.negated { p.negate() } else { p };
        combine(state, pending.connective, p);
    }
    Ok(())
}

fn combine(state: &mut BuilderState, connective: Connective, p: Predicate) {
    state.predicate = Some(match (connective, state.predicate.take()) {
        (Connective::And, Some(prev)) => prev.and(p),
        (Connective::Or, Some(prev)) => prev.or(p),
        _ => p,
    });
}

fn parse_columns(tokens: &str) -> LensResult<Vec<Column>> {
    let columns = tokens
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            Column::from_token(t)
                .ok_or_else(|| LensError::operation(format!("cannot parse projection token `{t}`")))
        })
        .collect::<LensResult<Vec<_>>>()?;
    ensure!(!columns.is_empty(), "empty projection");
    Ok(columns)
}

const OPERATORS: [&str; 8] = ["<>", "!=", "<=", ">=", "==", "=", "<", ">"];

fn parse_condition(cond: &str, scope: &AttributeScope) -> LensResult<Condition> {
    let cond = cond.trim();
    let (operand, rest) = if let Some(rest) = cond.strip_prefix("$v") {
        (Operand::Value, rest.trim_start())
    } else if let Some(rest) = cond.strip_prefix("$1") {
        (Operand::ValueId, rest.trim_start())
    } else {
        operation_err!("condition `{cond}` must start with `$v` or `$1`");
    };
    if rest.is_empty() {
        return Ok(Condition::Operand(operand));
    }
    let Some(symbol) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
        operation_err!("cannot parse condition `{cond}`");
    };
    let op = CmpOp::parse(symbol)
        .ok_or_else(|| LensError::internal(format!("operator `{symbol}` is not parseable")))?;
    let text = unquote(rest[symbol.len()..].trim());
    ensure!(!text.is_empty(), Operation: "condition `{cond}` has no operand");
    let value = match operand {
        Operand::Value => scope.value_type.parse_value(text)?,
        Operand::ValueId => text
            .parse::<u32>()
            .map(Value::from)
            .map_err(|_| LensError::operation(format!("`{text}` is not a value id")))?,
    };
    Ok(Condition::Complete(Predicate::Compare { operand, op, value }))
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperlens_core::ValueType;
    use hyperlens_store::MemoryStore;

    fn builder(filtered: bool) -> QueryBuilder {
        let scope = AttributeScope {
            model: 1,
            attribute: 5,
            value_type: ValueType::String,
            owner: 1,
            junction: false,
        };
        QueryBuilder::new(
            Arc::new(MemoryStore::new()),
            scope,
            "country",
            filtered,
            filtered.then(|| "FLT_1_1_MEM_X".to_string()),
        )
    }

    #[test]
    fn test_chain_leaves_prefix_untouched() {
        let base = builder(false).select().where_("$v").unwrap();
        let snapshot = base.clone();
        let brazil = base.in_(vec![Value::from("Brazil")]).unwrap();
        assert_eq!(base, snapshot);
        assert_ne!(brazil, base);
        // a dangling string operand is not a flag
        assert_eq!(base.predicate(), None);
        let ids = builder(false).select().where_("$1").unwrap();
        assert_eq!(
            ids.predicate(),
            Some(Predicate::IsTrue {
                operand: Operand::ValueId
            })
        );
    }

    #[test]
    fn test_dangling_operand_needs_a_flag_type() {
        let pending = builder(false).select().where_("$v").unwrap();
        assert!(matches!(pending.selection(), Err(LensError::Operation(_))));
        assert!(matches!(pending.build(), Err(LensError::Operation(_))));
        assert!(matches!(pending.descriptor(), Err(LensError::Operation(_))));
        assert!(matches!(pending.and_("$v = 'USA'"), Err(LensError::Operation(_))));

        let mut scope = pending.scope().clone();
        scope.value_type = ValueType::Bool;
        let flags = QueryBuilder::new(Arc::new(MemoryStore::new()), scope, "active", false, None)
            .select()
            .where_("$v")
            .unwrap();
        assert_eq!(
            flags.selection().unwrap().predicate,
            Some(Predicate::IsTrue {
                operand: Operand::Value
            })
        );
    }

    #[test]
    fn test_where_comparison_parses_typed_literal() {
        let b = builder(false).select().where_("$v = 'Brazil'").unwrap();
        assert_eq!(
            b.predicate(),
            Some(Predicate::Compare {
                operand: Operand::Value,
                op: CmpOp::Eq,
                value: Value::from("Brazil"),
            })
        );
        let ids = builder(false).select().where_("$1 >= 3").unwrap();
        assert_eq!(
            ids.predicate(),
            Some(Predicate::Compare {
                operand: Operand::ValueId,
                op: CmpOp::GtEq,
                value: Value::from(3u32),
            })
        );
    }

    #[test]
    fn test_connectives_and_negation() {
        let b = builder(false)
            .select()
            .where_("$v")
            .unwrap()
            .like("B%")
            .unwrap()
            .or_("$v")
            .unwrap()
            .not()
            .in_(vec![Value::from("USA")])
            .unwrap();
        assert_eq!(b.predicate().unwrap().to_string(), "($v LIKE 'B%' OR $v NOT IN (USA))");
    }

    #[test]
    fn test_missing_operands_are_rejected() {
        let b = builder(false).select();
        assert!(matches!(
            b.between(1u32, 2u32),
            Err(LensError::Operation(_))
        ));
        let pending = b.where_("$v").unwrap();
        assert!(matches!(pending.in_(Vec::new()), Err(LensError::Operation(_))));
        assert!(matches!(b.and_("$v = 1"), Err(LensError::Operation(_))));
        assert!(matches!(b.where_("val = 1"), Err(LensError::Operation(_))));
    }

    #[test]
    fn test_projection_tokens() {
        let b = builder(false);
        assert!(matches!(b.over("$v, $x", false, None), Err(LensError::Operation(_))));
        assert!(matches!(b.over("$v, $s", false, None), Err(LensError::Operation(_))));
        assert!(matches!(b.over("$v", false, Some(true)), Err(LensError::Operation(_))));

        let filtered = builder(true);
        let query = filtered.over("$v, $c, $s, $p", false, None).unwrap().build().unwrap();
        match query {
            Query::Project(p) => {
                assert_eq!(p.source, AtomSource::States);
                assert_eq!(p.columns.len(), 4);
            }
            other => panic!("unexpected query {other:?}"),
        }
        let forced = filtered.over("$v", true, None).unwrap().build().unwrap();
        assert!(matches!(forced, Query::Project(p) if p.source == AtomSource::Atoms));
    }

    #[test]
    fn test_order_parsing() {
        let b = builder(false).over("$v, $c", false, None).unwrap();
        let ordered = b.order("$c DESC, $v").unwrap();
        let Query::Project(p) = ordered.build().unwrap() else {
            panic!("expected a projection");
        };
        assert_eq!(
            p.order,
            vec![
                OrderKey {
                    column: Column::Count,
                    descending: true
                },
                OrderKey {
                    column: Column::Value,
                    descending: false
                }
            ]
        );
        assert!(b.order("$c SIDEWAYS").is_err());
        assert!(b.order("$hl").is_err());
        // position flags cannot order an unfiltered read
        assert!(b.order("$p DESC").unwrap().build().is_err());
    }

    #[test]
    fn test_count_validation() {
        let b = builder(false);
        assert!(b.count(CollectionKind::Set, true, false).build().is_err());
        let restricted = b
            .count(CollectionKind::Bag, false, true)
            .where_("$v = 'USA'")
            .unwrap();
        assert!(matches!(restricted.build(), Err(LensError::Operation(_))));

        let filtered = builder(true).count(CollectionKind::Val, true, false);
        let Query::CollectionCount { rows_table, .. } = filtered.build().unwrap() else {
            panic!("expected a count");
        };
        assert_eq!(rows_table.as_deref(), Some("FLT_1_1_MEM_X"));
        assert_eq!(filtered.query_id(), "Counting");
    }

    #[test]
    fn test_descriptor_requires_select() {
        let b = builder(false).where_("$v = 'USA'").unwrap();
        assert!(b.descriptor().is_err());
        let d = b.select().descriptor().unwrap();
        assert_eq!(d.alias, "country");
        assert!(d.predicate.is_some());
    }
}
