//! Filter engine of one data model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common_config::EngineConfig;
use common_display::TextTree;
use common_error::{LensError, LensResult, operation_err, state_err};
use hyperlens_core::{
    AttributeKey, DataModel, EntityKey, MetaNode, MetadataStore, ModelId, Value,
};
use hyperlens_store::{
    AttributeScope, CollectionKind, ColumnarStore, Operand, Predicate, ResultSet, Statement,
};

use crate::collection::AttributeValueCollection;
use crate::cql::QueryBuilder;
use crate::entity_set::{AssociativeEntitySet, AttributeCount, CountOrder, EntityCounts, FilterMode};
use crate::graph::{AssociativeGraph, PropagationStep};
use crate::selection::{self, SelectionDescriptor};

// ============================================================================
// Reports and requests
// ============================================================================

/// One entity transition of a filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub entity: EntityKey,
    pub alias: String,
    /// Junction the entity was reached through; `None` for the start entity.
    pub via: Option<AttributeKey>,
    /// Rows left after the transition.
    pub rows: u64,
}

/// Outcome of one filter pass: the start transition followed by the
/// propagated ones in BFS order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub transitions: Vec<Transition>,
    pub elapsed: Duration,
}

impl FilterReport {
    /// Rows left in `entity` after this pass, if the pass reached it.
    pub fn rows_of(&self, entity: EntityKey) -> Option<u64> {
        self.transitions
            .iter()
            .find(|t| t.entity == entity)
            .map(|t| t.rows)
    }

    /// Entity the pass started from.
    pub fn start(&self) -> Option<EntityKey> {
        self.transitions.first().map(|t| t.entity)
    }
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.transitions {
            write!(f, "{:<12} {:>8} rows", t.alias, t.rows)?;
            if let Some(via) = t.via {
                write!(f, "  via {via}")?;
            }
            writeln!(f)?;
        }
        write!(f, "elapsed {:?}", self.elapsed)
    }
}

/// Values for [`FilterEngine::filter_values`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValues {
    /// A `where_` condition, e.g. `$v >= 10`.
    Condition(String),
    /// Membership in a list of values.
    Values(Vec<Value>),
}

/// Options of [`FilterEngine::get_items`]; unset fields take engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsRequest {
    /// Owner in context, required for junction attributes seen from their
    /// second owner.
    pub owner: Option<EntityKey>,
    pub projection: Option<String>,
    pub order: Option<String>,
    /// `(limit, offset)`.
    pub limit: Option<(u64, u64)>,
    pub excluded: Option<bool>,
}

/// Distinct value counts of every attribute of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityItemCounts {
    pub entity: EntityKey,
    pub alias: String,
    pub counts: Vec<AttributeCount>,
}

// ============================================================================
// FilterEngine
// ============================================================================

/// Entity sets of a data model, their graph, and filter propagation.
///
/// Transitions run one at a time: every method that writes filter state
/// takes `&mut self`.
#[derive(Debug)]
pub struct FilterEngine {
    model: DataModel,
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn ColumnarStore>,
    config: EngineConfig,
    sets: BTreeMap<EntityKey, AssociativeEntitySet>,
    graph: AssociativeGraph,
}

impl FilterEngine {
    /// Load the entity sets and graph of data model `model`.
    pub async fn new(
        model: ModelId,
        metadata: Arc<dyn MetadataStore>,
        store: Arc<dyn ColumnarStore>,
        config: EngineConfig,
    ) -> LensResult<Self> {
        let started = Instant::now();
        let data_model = metadata.data_model(model).await?;
        let sets = load_sets(model, &metadata, &store, &config).await?;
        let graph = AssociativeGraph::build(metadata.as_ref(), model).await?;
        log::info!(
            "engine for `{}` on {} store: {} entity sets in {:?}",
            data_model.alias,
            store.name(),
            sets.len(),
            started.elapsed()
        );
        Ok(Self {
            model: data_model,
            metadata,
            store,
            config,
            sets,
            graph,
        })
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &AssociativeGraph {
        &self.graph
    }

    /// Entity sets in key order.
    pub fn entity_sets(&self) -> impl Iterator<Item = &AssociativeEntitySet> {
        self.sets.values()
    }

    pub fn entity_set(&self, key: EntityKey) -> LensResult<&AssociativeEntitySet> {
        self.sets
            .get(&key)
            .ok_or_else(|| LensError::metadata(format!("no entity set for {key}")))
    }

    pub fn entity_set_mut(&mut self, key: EntityKey) -> LensResult<&mut AssociativeEntitySet> {
        self.sets
            .get_mut(&key)
            .ok_or_else(|| LensError::metadata(format!("no entity set for {key}")))
    }

    /// Entity set by entity alias.
    pub fn find_entity_set(&self, alias: &str) -> LensResult<&AssociativeEntitySet> {
        self.sets
            .values()
            .find(|s| s.alias() == alias)
            .ok_or_else(|| LensError::metadata(format!("no entity `{alias}` in `{}`", self.model.alias)))
    }

    /// Collection of the attribute `alias`, seen from `owner`.
    ///
    /// A plain attribute has one owner and `owner` may be left out. A
    /// junction is seen from either partner, so the owner must be given.
    pub async fn collection(
        &self,
        alias: &str,
        owner: Option<EntityKey>,
    ) -> LensResult<AttributeValueCollection> {
        let attribute = self.metadata.find_attribute(self.model.id, alias).await?;
        let owner = match owner {
            Some(owner) => owner,
            None if attribute.junction => operation_err!(
                "junction `{alias}` is shared by two entities; give the owner in context"
            ),
            None => attribute.owner(),
        };
        AttributeValueCollection::new(
            MetaNode::Attribute(attribute),
            owner,
            self.metadata.clone(),
            self.store.clone(),
        )
        .await
    }

    async fn collection_of(
        &self,
        attribute: AttributeKey,
        owner: EntityKey,
    ) -> LensResult<AttributeValueCollection> {
        let attribute = self.metadata.get_attribute(attribute).await?;
        AttributeValueCollection::new(
            MetaNode::Attribute(attribute),
            owner,
            self.metadata.clone(),
            self.store.clone(),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Filtering
    // ------------------------------------------------------------------

    /// Filter with one `select` builder and propagate.
    pub async fn filter(&mut self, builder: &QueryBuilder) -> LensResult<Vec<FilterReport>> {
        self.filter_selections(vec![builder.descriptor()?], FilterMode::Single)
            .await
    }

    /// Filter with a batch of selections and propagate.
    ///
    /// In single mode each selection filters its own entity in turn. In
    /// multiple mode the selections on the first selection's entity are
    /// filtered together as one union and the others are skipped.
    pub async fn filter_selections(
        &mut self,
        selections: Vec<SelectionDescriptor>,
        mode: FilterMode,
    ) -> LensResult<Vec<FilterReport>> {
        let Some(first) = selections.first() else {
            state_err!("no selection to filter with");
        };
        match mode {
            FilterMode::Single => {
                let mut reports = Vec::with_capacity(selections.len());
                for selection in selections {
                    let start = selection.owner();
                    let set = self.entity_set_mut(start)?;
                    let restore = set.selections().len();
                    set.add_selection(selection)?;
                    reports.push(self.run_filter(start, mode, restore).await?);
                }
                Ok(reports)
            }
            FilterMode::Multiple => {
                let start = first.owner();
                let mut grouped = Vec::new();
                for selection in selections {
                    if selection.owner() == start {
                        grouped.push(selection);
                    } else {
                        log::warn!("selection {selection} skipped: not on entity {start}");
                    }
                }
                let set = self.entity_set_mut(start)?;
                let restore = set.selections().len();
                if let Err(err) = set.add_selections(grouped) {
                    set.truncate_selections(restore);
                    return Err(err);
                }
                Ok(vec![self.run_filter(start, mode, restore).await?])
            }
        }
    }

    async fn run_filter(
        &mut self,
        start: EntityKey,
        mode: FilterMode,
        restore: usize,
    ) -> LensResult<FilterReport> {
        let started = Instant::now();
        let set = self.entity_set_mut(start)?;
        let rows = match set.filter(mode, false).await {
            Ok(rows) => rows,
            Err(err) => {
                // rejected before dispatch: forget the selections just added
                if !err.is_execution() {
                    set.truncate_selections(restore);
                }
                return Err(err);
            }
        };
        let mut transitions = vec![Transition {
            entity: start,
            alias: set.alias().to_string(),
            via: None,
            rows,
        }];

        let steps: Vec<PropagationStep> = self.graph.bfs_edges(start)?.collect();
        for step in steps {
            log::debug!("propagating {step}");
            let rows = self.propagate(step).await?;
            transitions.push(Transition {
                entity: step.tail,
                alias: self.entity_set(step.tail)?.alias().to_string(),
                via: Some(step.junction),
                rows,
            });
        }

        let report = FilterReport {
            transitions,
            elapsed: started.elapsed(),
        };
        log::info!(
            "filter pass from {start} touched {} entities in {:?}",
            report.transitions.len(),
            report.elapsed
        );
        Ok(report)
    }

    /// Filter `step.tail` by the junction values still reachable from
    /// `step.head`.
    async fn propagate(&mut self, step: PropagationStep) -> LensResult<u64> {
        let table = self.entity_set(step.head)?.tables().junction_values();
        let head = self.collection_of(step.junction, step.head).await?;
        let reachable = head.query().over("$1", false, Some(false))?.build()?;
        for (label, statement) in [
            (
                "Drop junction values",
                Statement::DropTable {
                    name: table.clone(),
                },
            ),
            (
                "Create junction values",
                Statement::CreateMemoryTable {
                    name: table.clone(),
                    column: "ha1".to_string(),
                },
            ),
            (
                "Insert junction values",
                Statement::InsertInto {
                    table: table.clone(),
                    source: reachable,
                },
            ),
        ] {
            self.store.execute(&statement, label).await?;
        }

        let junction = self.metadata.get_attribute(step.junction).await?;
        let derived = SelectionDescriptor::new(
            AttributeScope::new(&junction, step.tail),
            junction.alias.clone(),
            Some(Predicate::InTable {
                operand: Operand::ValueId,
                table,
                negated: false,
            }),
        );
        let tail = self.entity_set_mut(step.tail)?;
        tail.add_selection(derived)?;
        let result = tail.filter(FilterMode::Single, true).await;
        tail.pop_selection();
        result
    }

    /// Filter by values of the attribute `alias` and propagate.
    ///
    /// Junctions need an owner; filter them through [`collection`](Self::collection)
    /// and [`filter`](Self::filter).
    pub async fn filter_values(
        &mut self,
        alias: &str,
        values: FilterValues,
    ) -> LensResult<Vec<FilterReport>> {
        let select = self.collection(alias, None).await?.query().select();
        let builder = match values {
            FilterValues::Condition(cond) => select.where_(&cond)?,
            FilterValues::Values(values) => select.where_("$v")?.in_(values)?,
        };
        self.filter(&builder).await
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Ranked listing of the values of attribute `alias`.
    pub async fn get_items(&self, alias: &str, request: ItemsRequest) -> LensResult<ResultSet> {
        let mut hacol = self.collection(alias, request.owner).await?;
        let projection = request.projection.unwrap_or_else(|| {
            if hacol.is_filtered() {
                "$v, $c, $s, $p".to_string()
            } else {
                "$v, $c".to_string()
            }
        });
        let order = request
            .order
            .unwrap_or_else(|| self.config.default_item_order.clone());
        let mut builder = hacol
            .query()
            .over(&projection, false, request.excluded)?
            .order(&order)?;
        let limit = request
            .limit
            .or_else(|| self.config.default_item_limit.map(|l| (l as u64, 0)));
        if let Some((limit, offset)) = limit {
            builder = builder.limit(limit, offset);
        }
        hacol.run(&builder).await
    }

    /// Distinct value counts of every entity's attributes.
    pub async fn count_items(&mut self) -> LensResult<Vec<EntityItemCounts>> {
        let mut out = Vec::with_capacity(self.sets.len());
        for set in self.sets.values_mut() {
            let counts = match set
                .count(CollectionKind::Set, None, false, CountOrder::Key, None)
                .await?
            {
                EntityCounts::Attributes(counts) => counts,
                EntityCounts::Rows(_) => Vec::new(),
            };
            out.push(EntityItemCounts {
                entity: set.key(),
                alias: set.alias().to_string(),
                counts,
            });
        }
        Ok(out)
    }

    /// Pending selections of every entity, in entity order.
    pub fn selections(&self) -> Vec<SelectionDescriptor> {
        self.sets
            .values()
            .flat_map(|s| s.selections().iter().cloned())
            .collect()
    }

    /// Propagation tree from the entity `alias`.
    pub fn explain_graph(&self, alias: &str) -> LensResult<TextTree> {
        self.graph.explain(self.find_entity_set(alias)?.key())
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Reset the states of the whole model, then rebuild the entity sets
    /// and graph from the current metadata.
    pub async fn restart(&mut self) -> LensResult<()> {
        let started = Instant::now();
        self.store
            .execute(&Statement::ResetStates { model: self.model.id }, "Reset states")
            .await?;
        for set in self.sets.values_mut() {
            set.reset().await?;
        }
        let id = self.model.id;
        self.model = self.metadata.data_model(id).await?;
        self.sets = load_sets(id, &self.metadata, &self.store, &self.config).await?;
        self.graph = AssociativeGraph::build(self.metadata.as_ref(), id).await?;
        log::info!(
            "restarted `{}` with {} entity sets in {:?}",
            self.model.alias,
            self.sets.len(),
            started.elapsed()
        );
        Ok(())
    }

    /// Reset one entity set.
    pub async fn reset_entity(&mut self, alias: &str) -> LensResult<()> {
        let key = self.find_entity_set(alias)?.key();
        self.entity_set_mut(key)?.reset().await
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Save the pending selections of every entity.
    pub fn save_selections(&self, path: impl AsRef<Path>) -> LensResult<()> {
        selection::save_selections(path, &self.selections())
    }

    /// Load selections saved by [`save_selections`](Self::save_selections).
    pub fn load_selections(&self, path: impl AsRef<Path>) -> LensResult<Vec<SelectionDescriptor>> {
        let loaded = selection::load_selections(path)?;
        if let Some(foreign) = loaded.iter().find(|s| s.scope.model != self.model.id) {
            return Err(LensError::metadata(format!(
                "selection `{foreign}` belongs to model {}, not `{}`",
                foreign.scope.model, self.model.alias
            )));
        }
        Ok(loaded)
    }

    /// A `select` builder equivalent to a saved descriptor.
    pub async fn reconstruct_selection(
        &self,
        descriptor: &SelectionDescriptor,
    ) -> LensResult<QueryBuilder> {
        let hacol = self
            .collection_of(descriptor.attribute(), descriptor.owner())
            .await?;
        Ok(hacol
            .query()
            .select()
            .with_predicate(descriptor.predicate.clone()))
    }
}

async fn load_sets(
    model: ModelId,
    metadata: &Arc<dyn MetadataStore>,
    store: &Arc<dyn ColumnarStore>,
    config: &EngineConfig,
) -> LensResult<BTreeMap<EntityKey, AssociativeEntitySet>> {
    let mut sets = BTreeMap::new();
    for entity in metadata.entities(model).await? {
        let key = entity.key;
        let set = AssociativeEntitySet::new(
            MetaNode::Entity(entity),
            metadata.clone(),
            store.clone(),
            config,
        )
        .await?;
        sets.insert(key, set);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperlens_store::test_utils::{CATALOG, SUPPLIERS, SupplyFixture, supply_fixture};

    async fn engine() -> (SupplyFixture, FilterEngine) {
        let fx = supply_fixture().await.unwrap();
        let engine = FilterEngine::new(1, fx.metadata.clone(), fx.store.clone(), EngineConfig::default())
            .await
            .unwrap();
        (fx, engine)
    }

    #[tokio::test]
    async fn test_lookup() {
        let (fx, engine) = engine().await;
        assert_eq!(engine.model().alias, "supply");
        assert_eq!(engine.entity_sets().count(), 3);
        assert_eq!(engine.find_entity_set("part").unwrap().key(), fx.part);
        assert!(matches!(engine.find_entity_set("order"), Err(LensError::Metadata(_))));
        let sid = engine.collection("sid", Some(fx.catalog)).await.unwrap();
        assert_eq!(sid.owner().key, fx.catalog);
    }

    #[tokio::test]
    async fn test_filter_values_propagates() {
        let (fx, mut engine) = engine().await;
        let reports = engine
            .filter_values("country", FilterValues::Values(vec![Value::from("Brazil")]))
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.start(), Some(fx.supplier));
        let brazilian: Vec<u32> = SUPPLIERS
            .iter()
            .filter(|(_, _, country)| *country == "Brazil")
            .map(|(sid, _, _)| *sid)
            .collect();
        let rows: Vec<(u32, u32, f64)> = CATALOG
            .into_iter()
            .filter(|(sid, _, _)| brazilian.contains(sid))
            .collect();
        let mut parts: Vec<u32> = rows.iter().map(|(_, pid, _)| *pid).collect();
        parts.sort_unstable();
        parts.dedup();
        assert_eq!(report.rows_of(fx.supplier), Some(brazilian.len() as u64));
        assert_eq!(report.rows_of(fx.catalog), Some(rows.len() as u64));
        assert_eq!(report.rows_of(fx.part), Some(parts.len() as u64));
        assert_eq!(report.transitions[1].via, Some(fx.sid));
        assert_eq!(report.transitions[2].via, Some(fx.pid));
        // derived selections do not stay pending
        assert_eq!(engine.selections().len(), 1);
    }

    #[tokio::test]
    async fn test_junction_needs_an_owner() {
        let (fx, mut engine) = engine().await;
        assert!(matches!(
            engine.collection("sid", None).await,
            Err(LensError::Operation(_))
        ));
        assert!(matches!(
            engine
                .filter_values("sid", FilterValues::Values(vec![Value::from(3u32)]))
                .await,
            Err(LensError::Operation(_))
        ));
        let country = engine.collection("country", None).await.unwrap();
        assert_eq!(country.owner().key, fx.supplier);
    }

    #[tokio::test]
    async fn test_restart_rebuilds_from_metadata() {
        let (fx, mut engine) = engine().await;
        engine
            .filter_values("country", FilterValues::Values(vec![Value::from("USA")]))
            .await
            .unwrap();
        let order = fx
            .metadata
            .update(|catalog| catalog.add_entity(1, "Orders", "order"))
            .await
            .unwrap();
        assert!(engine.find_entity_set("order").is_err());

        engine.restart().await.unwrap();
        assert_eq!(engine.entity_sets().count(), 4);
        assert_eq!(engine.find_entity_set("order").unwrap().key(), order);
        assert!(engine.selections().is_empty());
        for set in engine.entity_sets() {
            assert!(!set.is_filtered());
            assert_eq!(set.buffers(), &hyperlens_core::BufferPair::initial(set.key()));
        }
        // the new entity shares no junction
        assert_eq!(engine.graph().node_count(), 4);
        assert_eq!(engine.graph().edge_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let (_, mut engine) = engine().await;
        assert!(matches!(
            engine.filter_selections(Vec::new(), FilterMode::Single).await,
            Err(LensError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_explain_graph() {
        let (_, engine) = engine().await;
        assert_eq!(
            engine.explain_graph("supplier").unwrap().to_string(),
            "supplier\n└─ catalog (via sid)\n   └─ part (via pid)\n"
        );
    }
}
