//! Filtering state machine of one entity.
//!
//! An [`AssociativeEntitySet`] owns the pending selections of its entity and
//! the double-buffered row sets a filter transition writes. A transition is a
//! fixed statement sequence:
//!
//! 1. clear the entity's state partitions
//! 2. drop and recreate the `new_set` buffer
//! 3. insert the selected row ids into `new_set`
//! 4. refresh `pos` flags from `new_set` through `VW_pos`
//! 5. mark `sel` flags through `VW_sel`, when there are triggering selections
//!
//! after which `old_set` and `new_set` swap and the swap is persisted through
//! [`MetadataStore::set_buffers`]. The store offers no transaction across the
//! sequence, so a failure part way leaves the set [`SetState::Inconsistent`]
//! until [`reset`](AssociativeEntitySet::reset).

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use common_config::EngineConfig;
use common_error::{LensError, LensResult, operation_err, state_err};
use hyperlens_core::{
    Attribute, AttributeKey, BufferPair, Entity, EntityKey, FilterTables, JunctionFilter,
    MetaNode, MetadataStore,
};
use hyperlens_store::{
    CollectionKind, ColumnarStore, LabeledStatement, Query, RowSelection, RowSource, Selection,
    Statement,
};

use crate::selection::SelectionDescriptor;

// ============================================================================
// Modes and states
// ============================================================================

/// Filter state of an entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    Unfiltered,
    Filtered,
    /// A transition failed part way; only `reset` is allowed.
    Inconsistent,
}

impl fmt::Display for SetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unfiltered => "unfiltered",
            Self::Filtered => "filtered",
            Self::Inconsistent => "inconsistent",
        };
        write!(f, "{name}")
    }
}

/// How pending selections combine in a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// The last selection, intersected with the current rows.
    #[default]
    Single,
    /// The union of every pending selection.
    Multiple,
}

impl FromStr for FilterMode {
    type Err = LensError;

    fn from_str(s: &str) -> LensResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            _ => operation_err!("unknown filtering mode `{s}`"),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// Ordering of per-attribute counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountOrder {
    #[default]
    Key,
    Label,
    /// Descending count, ties by key.
    Count,
}

/// Count of one attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCount {
    pub attribute: AttributeKey,
    pub alias: String,
    pub count: u64,
}

/// Result of [`AssociativeEntitySet::count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityCounts {
    Rows(u64),
    Attributes(Vec<AttributeCount>),
}

impl EntityCounts {
    /// Count of one attribute, if this is a per-attribute result.
    pub fn of(&self, attribute: AttributeKey) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Attributes(counts) => counts
                .iter()
                .find(|c| c.attribute == attribute)
                .map(|c| c.count),
        }
    }
}

// ============================================================================
// AssociativeEntitySet
// ============================================================================

/// Rows of one entity and their filter state.
#[derive(Debug)]
pub struct AssociativeEntitySet {
    entity: Entity,
    attributes: Vec<Attribute>,
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn ColumnarStore>,
    config: EngineConfig,
    state: SetState,
    tables: FilterTables,
    selections: Vec<SelectionDescriptor>,
    row_count: Option<u64>,
    last_statements: Vec<LabeledStatement>,
}

impl AssociativeEntitySet {
    /// Bind a set to an entity node and recover its filter state.
    pub async fn new(
        node: MetaNode,
        metadata: Arc<dyn MetadataStore>,
        store: Arc<dyn ColumnarStore>,
        config: &EngineConfig,
    ) -> LensResult<Self> {
        let entity = node.into_entity()?;
        let attributes = metadata
            .attributes_of(entity.key, JunctionFilter::All)
            .await?;
        let mut set = Self {
            tables: FilterTables::new(entity.key),
            entity,
            attributes,
            metadata,
            store,
            config: config.clone(),
            state: SetState::Unfiltered,
            selections: Vec::new(),
            row_count: None,
            last_statements: Vec::new(),
        };
        set.activate().await?;
        Ok(set)
    }

    async fn exists(&self, name: &str) -> LensResult<bool> {
        let query = Query::TableExists {
            name: name.to_string(),
        };
        Ok(self.store.query(&query, "Table exists").await?.scalar_u64()? > 0)
    }

    /// Derive the state from the store: a `VW_pos` view means the entity was
    /// left filtered with the persisted buffer pointers.
    pub async fn activate(&mut self) -> LensResult<SetState> {
        let view = self.exists(&self.tables.positions_view()).await?;
        let rows = self.exists(&self.entity.buffers.old_set).await?;
        self.state = match (view, rows) {
            (true, true) => SetState::Filtered,
            (true, false) => {
                log::warn!(
                    "{} has `{}` but no row set `{}`; reset required",
                    self.entity.alias,
                    self.tables.positions_view(),
                    self.entity.buffers.old_set
                );
                SetState::Inconsistent
            }
            (false, _) => SetState::Unfiltered,
        };
        log::debug!("{} activated as {}", self.entity.alias, self.state);
        Ok(self.state)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn key(&self) -> EntityKey {
        self.entity.key
    }

    pub fn alias(&self) -> &str {
        &self.entity.alias
    }

    /// Attributes of the entity, junctions included.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn state(&self) -> SetState {
        self.state
    }

    pub fn is_filtered(&self) -> bool {
        self.state == SetState::Filtered
    }

    pub fn buffers(&self) -> &BufferPair {
        &self.entity.buffers
    }

    pub fn tables(&self) -> &FilterTables {
        &self.tables
    }

    /// Row count recorded by the last count or transition.
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Statements of the last attempted transition.
    pub fn last_statements(&self) -> &[LabeledStatement] {
        &self.last_statements
    }

    // ------------------------------------------------------------------
    // Selections
    // ------------------------------------------------------------------

    /// Queue a selection on this entity's rows.
    pub fn add_selection(&mut self, selection: SelectionDescriptor) -> LensResult<()> {
        if selection.owner() != self.entity.key {
            operation_err!(
                "selection `{selection}` picks rows of {}, not of `{}`",
                selection.owner(),
                self.entity.alias
            );
        }
        selection.validate()?;
        self.selections.push(selection);
        Ok(())
    }

    pub fn add_selections(
        &mut self,
        selections: impl IntoIterator<Item = SelectionDescriptor>,
    ) -> LensResult<()> {
        for selection in selections {
            self.add_selection(selection)?;
        }
        Ok(())
    }

    /// Remove the selection at `index`.
    pub fn del_selection(&mut self, index: usize) -> LensResult<SelectionDescriptor> {
        if index >= self.selections.len() {
            return Err(LensError::invalid_parameter(format!(
                "selection index {index} out of range for {} selections",
                self.selections.len()
            )));
        }
        Ok(self.selections.remove(index))
    }

    pub fn pop_selection(&mut self) -> Option<SelectionDescriptor> {
        self.selections.pop()
    }

    pub fn truncate_selections(&mut self, len: usize) {
        self.selections.truncate(len);
    }

    pub fn clear_selections(&mut self) {
        self.selections.clear();
    }

    pub fn selections(&self) -> &[SelectionDescriptor] {
        &self.selections
    }

    // ------------------------------------------------------------------
    // Counting
    // ------------------------------------------------------------------

    /// Rows currently in the entity's extension.
    ///
    /// An unfiltered entity is counted with the configured estimate setting.
    pub async fn count_rows(&mut self) -> LensResult<u64> {
        self.count_rows_with(self.config.estimate_row_counts).await
    }

    /// Rows currently in the entity's extension, estimated or exact.
    ///
    /// `estimate` only applies to an unfiltered entity; a filtered row set
    /// is always counted exactly.
    pub async fn count_rows_with(&mut self, estimate: bool) -> LensResult<u64> {
        let query = self.row_count_query(estimate)?;
        let rows = self.store.query(&query, "Row count").await?.scalar_u64()?;
        self.row_count = Some(rows);
        Ok(rows)
    }

    fn row_count_query(&self, estimate: bool) -> LensResult<Query> {
        let source = match self.state {
            SetState::Filtered => RowSource::Table(self.entity.buffers.old_set.clone()),
            SetState::Unfiltered => RowSource::Links { exact: !estimate },
            SetState::Inconsistent => state_err!(
                "`{}` is inconsistent after a failed transition; reset it first",
                self.entity.alias
            ),
        };
        Ok(Query::RowCount {
            entity: self.entity.key,
            source,
        })
    }

    /// Count rows (`val`), or distinct values (`set`) or value references
    /// (`bag`) per attribute.
    ///
    /// `projection` restricts the result to the named attributes.
    /// `missing` turns a bag count into the rows referencing no value of
    /// the attribute. `estimate` overrides the configured row count setting
    /// for `val` and `missing` counts.
    pub async fn count(
        &mut self,
        kind: CollectionKind,
        projection: Option<&[&str]>,
        missing: bool,
        order: CountOrder,
        estimate: Option<bool>,
    ) -> LensResult<EntityCounts> {
        let estimate = estimate.unwrap_or(self.config.estimate_row_counts);
        if kind == CollectionKind::Val {
            return Ok(EntityCounts::Rows(self.count_rows_with(estimate).await?));
        }
        if missing && kind == CollectionKind::Set {
            operation_err!("missing counts are defined for bag collections only");
        }
        let wanted: Option<Vec<AttributeKey>> = match projection {
            Some(aliases) => Some(
                aliases
                    .iter()
                    .map(|alias| {
                        self.attributes
                            .iter()
                            .find(|a| a.alias == *alias)
                            .map(|a| a.key)
                            .ok_or_else(|| {
                                LensError::operation(format!(
                                    "`{alias}` is not an attribute of `{}`",
                                    self.entity.alias
                                ))
                            })
                    })
                    .collect::<LensResult<_>>()?,
            ),
            None => None,
        };
        let filtered = match self.state {
            SetState::Filtered => true,
            SetState::Unfiltered => false,
            SetState::Inconsistent => {
                state_err!("`{}` must be reset before counting", self.entity.alias)
            }
        };
        let query = Query::AttributeCounts {
            entity: self.entity.key,
            kind,
            filtered,
            rows_table: filtered.then(|| self.entity.buffers.old_set.clone()),
        };
        let result = self.store.query(&query, "Counting").await?;
        let ids = result.column_values("ha2")?;
        let counts = result.column_values("cnt")?;
        let by_id: HashMap<u16, u64> = ids
            .iter()
            .zip(&counts)
            .filter_map(|(id, cnt)| {
                let id = u16::try_from(id.as_int64()?).ok()?;
                Some((id, cnt.as_u64()?))
            })
            .collect();

        let rows = if missing {
            self.count_rows_with(estimate).await?
        } else {
            0
        };
        let mut out: Vec<AttributeCount> = self
            .attributes
            .iter()
            .filter(|attr| wanted.as_ref().is_none_or(|keys| keys.contains(&attr.key)))
            .map(|attr| {
                let count = by_id.get(&attr.key.attribute).copied().unwrap_or(0);
                AttributeCount {
                    attribute: attr.key,
                    alias: attr.alias.clone(),
                    count: if missing { rows.saturating_sub(count) } else { count },
                }
            })
            .collect();
        match order {
            CountOrder::Key => out.sort_by_key(|c| c.attribute),
            CountOrder::Label => out.sort_by(|a, b| a.alias.cmp(&b.alias)),
            CountOrder::Count => out.sort_by_key(|c| (Reverse(c.count), c.attribute)),
        }
        Ok(EntityCounts::Attributes(out))
    }

    // ------------------------------------------------------------------
    // Filtering
    // ------------------------------------------------------------------

    /// Assemble the statements of a transition without dispatching them.
    ///
    /// With `propagate`, the last selection is a derived one: it narrows the
    /// rows but does not mark `sel` flags.
    pub fn plan_filter(&self, mode: FilterMode, propagate: bool) -> LensResult<Vec<LabeledStatement>> {
        if self.state == SetState::Inconsistent {
            state_err!(
                "`{}` is inconsistent after a failed transition; reset it first",
                self.entity.alias
            );
        }
        let Some(last) = self.selections.last() else {
            state_err!("no selection defined for `{}`", self.entity.alias);
        };
        if mode == FilterMode::Multiple && self.selections.len() < 2 {
            state_err!(
                "filtering `{}` in multiple mode needs at least two selections, found {}",
                self.entity.alias,
                self.selections.len()
            );
        }
        for selection in &self.selections {
            selection.validate()?;
        }

        let filtered = self.is_filtered();
        let BufferPair { old_set, new_set } = &self.entity.buffers;
        let rows = match mode {
            FilterMode::Single => RowSelection {
                selections: vec![last.to_selection()],
                within: filtered.then(|| old_set.clone()),
            },
            FilterMode::Multiple => RowSelection {
                selections: self.selections.iter().map(|s| s.to_selection()).collect(),
                within: (propagate && filtered).then(|| old_set.clone()),
            },
        };
        let marked = if propagate {
            &self.selections[..self.selections.len() - 1]
        } else {
            &self.selections[..]
        };
        let marks: Vec<Selection> = marked.iter().map(|s| s.to_selection()).collect();
        let column = if *new_set == self.tables.buffer_x() {
            "hbx"
        } else {
            "hbz"
        };

        let key = self.entity.key;
        let mut statements = vec![
            LabeledStatement::new(
                "Clear states",
                Statement::ClearStates {
                    entity: key,
                    attributes: self.attributes.iter().map(|a| a.key.attribute).collect(),
                },
            ),
            LabeledStatement::new(
                "Drop new set",
                Statement::DropTable {
                    name: new_set.clone(),
                },
            ),
            LabeledStatement::new(
                "Create new set",
                Statement::CreateMemoryTable {
                    name: new_set.clone(),
                    column: column.to_string(),
                },
            ),
            LabeledStatement::new(
                "Insert filtered rows",
                Statement::InsertInto {
                    table: new_set.clone(),
                    source: Query::SelectRows(rows),
                },
            ),
            LabeledStatement::new(
                "Refresh positions",
                Statement::RefreshPositions {
                    entity: key,
                    rows_table: new_set.clone(),
                    view: self.tables.positions_view(),
                },
            ),
        ];
        if !marks.is_empty() {
            statements.push(LabeledStatement::new(
                "Mark selected",
                Statement::MarkSelected {
                    entity: key,
                    view: self.tables.selections_view(),
                    selections: marks,
                },
            ));
        }
        Ok(statements)
    }

    /// Run a transition and return the new row count.
    pub async fn filter(&mut self, mode: FilterMode, propagate: bool) -> LensResult<u64> {
        let started = Instant::now();
        let statements = self.plan_filter(mode, propagate)?;
        self.last_statements = statements.clone();
        for labeled in &statements {
            log::debug!("{}: {}", self.entity.alias, labeled.label);
            if let Err(err) = self.store.execute(&labeled.statement, &labeled.label).await {
                return Err(self.abandon(err));
            }
        }

        let swapped = self.entity.buffers.swapped();
        if let Err(err) = self.metadata.set_buffers(self.entity.key, swapped.clone()).await {
            return Err(self.abandon(err));
        }
        self.entity.buffers = swapped;
        self.state = SetState::Filtered;
        let rows = self.count_rows().await?;
        log::info!(
            "filtered {} ({mode}{}): {rows} rows in {:?}",
            self.entity.alias,
            if propagate { ", propagated" } else { "" },
            started.elapsed()
        );
        Ok(rows)
    }

    /// Mark the set inconsistent after a failed transition step.
    fn abandon(&mut self, err: LensError) -> LensError {
        self.state = SetState::Inconsistent;
        log::warn!(
            "filter transition of {} failed part way; reset required: {err}",
            self.entity.alias
        );
        match err {
            LensError::Execution {
                query_id,
                diagnostic,
            } => LensError::execution_with_lines(query_id, diagnostic, self.config.diagnostic_lines),
            other => other,
        }
    }

    /// Drop every filter table, clear the state partitions, and point the
    /// buffers back at their initial names.
    pub async fn reset(&mut self) -> LensResult<()> {
        let started = Instant::now();
        for name in self.tables.all() {
            self.store
                .execute(&Statement::DropTable { name }, "Drop filter table")
                .await?;
        }
        let clear = Statement::ClearStates {
            entity: self.entity.key,
            attributes: self.attributes.iter().map(|a| a.key.attribute).collect(),
        };
        self.store.execute(&clear, "Clear states").await?;

        let initial = BufferPair::initial(self.entity.key);
        self.metadata
            .set_buffers(self.entity.key, initial.clone())
            .await?;
        self.entity.buffers = initial;
        self.selections.clear();
        self.row_count = None;
        self.state = SetState::Unfiltered;
        log::info!("reset {} in {:?}", self.entity.alias, started.elapsed());
        Ok(())
    }
}
