//! Entity graph induced by junction attributes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use petgraph::Undirected;
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::{EdgeRef, VisitMap, Visitable};

use common_display::TextTree;
use common_error::{LensError, LensResult};
use hyperlens_core::{AttributeKey, EntityKey, JunctionFilter, MetadataStore, ModelId};

/// A graph node: one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNode {
    pub key: EntityKey,
    pub alias: String,
}

/// A graph edge: the junction attribute joining two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionEdge {
    pub attribute: AttributeKey,
    pub alias: String,
}

/// One edge of a breadth-first walk: filter `tail` from `head` through `junction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationStep {
    pub head: EntityKey,
    pub tail: EntityKey,
    pub junction: AttributeKey,
}

impl fmt::Display for PropagationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.head, self.junction, self.tail)
    }
}

type EntityGraph = Graph<EntityNode, JunctionEdge, Undirected>;

/// Entities of a data model joined by their junction attributes.
///
/// There is one edge per junction label, so a walk never filters the same
/// entity pair twice through the same attribute.
#[derive(Debug, Clone, Default)]
pub struct AssociativeGraph {
    graph: EntityGraph,
    index: HashMap<EntityKey, NodeIndex>,
}

impl AssociativeGraph {
    /// Build the graph of data model `model`.
    pub async fn build(metadata: &dyn MetadataStore, model: ModelId) -> LensResult<Self> {
        let mut out = Self::default();
        let entities = metadata.entities(model).await?;
        for entity in &entities {
            out.add_entity(entity.key, &entity.alias);
        }
        let mut labels = HashSet::new();
        for entity in &entities {
            for junction in metadata
                .attributes_of(entity.key, JunctionFilter::Only)
                .await?
            {
                if !labels.insert(junction.alias.clone()) {
                    continue;
                }
                let (left, right) = metadata.junction_partners(junction.key).await?;
                let tail = if left == entity.key { right } else { left };
                out.add_edge(entity.key, tail, junction.key, &junction.alias)?;
            }
        }
        log::debug!(
            "graph of model {model}: {} entities, {} junctions",
            out.node_count(),
            out.edge_count()
        );
        Ok(out)
    }

    /// Add an entity node; adding a known entity is a no-op.
    pub fn add_entity(&mut self, key: EntityKey, alias: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.graph.add_node(EntityNode {
            key,
            alias: alias.to_string(),
        });
        self.index.insert(key, idx);
        idx
    }

    /// Join two known entities through a junction attribute.
    pub fn add_edge(
        &mut self,
        head: EntityKey,
        tail: EntityKey,
        attribute: AttributeKey,
        alias: &str,
    ) -> LensResult<EdgeIndex> {
        let a = self.node_index(head)?;
        let b = self.node_index(tail)?;
        Ok(self.graph.add_edge(
            a,
            b,
            JunctionEdge {
                attribute,
                alias: alias.to_string(),
            },
        ))
    }

    fn node_index(&self, key: EntityKey) -> LensResult<NodeIndex> {
        self.index
            .get(&key)
            .copied()
            .ok_or_else(|| LensError::metadata(format!("entity {key} is not in the graph")))
    }

    pub fn node(&self, key: EntityKey) -> Option<&EntityNode> {
        self.index.get(&key).map(|idx| &self.graph[*idx])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Entities directly joined to `key`, with the joining attribute, in
    /// edge insertion order.
    pub fn neighbors(&self, key: EntityKey) -> LensResult<Vec<(EntityKey, AttributeKey)>> {
        let idx = self.node_index(key)?;
        Ok(self
            .incident(idx)
            .into_iter()
            .map(|(other, edge)| (self.graph[other].key, self.graph[edge].attribute))
            .collect())
    }

    fn incident(&self, idx: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut edges: Vec<(NodeIndex, EdgeIndex)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (other, e.id())
            })
            .collect();
        edges.sort_by_key(|(_, edge)| edge.index());
        edges
    }

    /// Breadth-first edges from `start`; each call walks from scratch.
    pub fn bfs_edges(&self, start: EntityKey) -> LensResult<BfsEdges<'_>> {
        let start = self.node_index(start)?;
        let mut discovered = self.graph.visit_map();
        discovered.visit(start);
        Ok(BfsEdges {
            graph: self,
            queue: VecDeque::from([start]),
            discovered,
            ready: VecDeque::new(),
        })
    }

    /// Propagation tree from `start`, one child per BFS edge.
    pub fn explain(&self, start: EntityKey) -> LensResult<TextTree> {
        let root_alias = self
            .node(start)
            .map(|n| n.alias.clone())
            .ok_or_else(|| LensError::metadata(format!("entity {start} is not in the graph")))?;
        let mut root = TextTree::new(root_alias);
        let mut paths: HashMap<EntityKey, Vec<usize>> = HashMap::from([(start, Vec::new())]);
        for step in self.bfs_edges(start)? {
            let path = paths.get(&step.head).cloned().unwrap_or_default();
            let mut parent = &mut root;
            for i in &path {
                parent = parent
                    .child_mut(*i)
                    .ok_or_else(|| LensError::internal("propagation tree path out of range"))?;
            }
            let tail = self.node(step.tail).map_or("?", |n| n.alias.as_str());
            let via = self.junction_alias(step.head, step.tail, step.junction);
            parent.push(TextTree::new(tail).with_detail(format!("via {via}")));
            let mut child_path = path;
            child_path.push(parent.children().len() - 1);
            paths.insert(step.tail, child_path);
        }
        Ok(root)
    }

    fn junction_alias(&self, head: EntityKey, tail: EntityKey, junction: AttributeKey) -> String {
        let (Some(a), Some(b)) = (self.index.get(&head), self.index.get(&tail)) else {
            return junction.to_string();
        };
        self.graph
            .edges_connecting(*a, *b)
            .find(|e| e.weight().attribute == junction)
            .map_or_else(|| junction.to_string(), |e| e.weight().alias.clone())
    }
}

/// Lazy breadth-first edge walk returned by [`AssociativeGraph::bfs_edges`].
pub struct BfsEdges<'a> {
    graph: &'a AssociativeGraph,
    queue: VecDeque<NodeIndex>,
    discovered: <EntityGraph as Visitable>::Map,
    ready: VecDeque<PropagationStep>,
}

impl Iterator for BfsEdges<'_> {
    type Item = PropagationStep;

    fn next(&mut self) -> Option<PropagationStep> {
        while self.ready.is_empty() {
            let head = self.queue.pop_front()?;
            for (tail, edge) in self.graph.incident(head) {
                if self.discovered.visit(tail) {
                    self.queue.push_back(tail);
                    self.ready.push_back(PropagationStep {
                        head: self.graph.graph[head].key,
                        tail: self.graph.graph[tail].key,
                        junction: self.graph.graph[edge].attribute,
                    });
                }
            }
        }
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperlens_store::test_utils::supply_fixture;

    fn key(e: u16) -> EntityKey {
        EntityKey::new(1, e)
    }

    fn attr(a: u16) -> AttributeKey {
        AttributeKey::new(1, a)
    }

    /// a - b - d, a - c - d, e isolated
    fn diamond() -> AssociativeGraph {
        let mut g = AssociativeGraph::default();
        for (e, alias) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")] {
            g.add_entity(key(e), alias);
        }
        g.add_edge(key(1), key(2), attr(10), "ab").unwrap();
        g.add_edge(key(1), key(3), attr(11), "ac").unwrap();
        g.add_edge(key(2), key(4), attr(12), "bd").unwrap();
        g.add_edge(key(3), key(4), attr(13), "cd").unwrap();
        g
    }

    #[test]
    fn test_bfs_edges_level_order() {
        let g = diamond();
        let steps: Vec<_> = g.bfs_edges(key(1)).unwrap().collect();
        assert_eq!(
            steps,
            vec![
                PropagationStep {
                    head: key(1),
                    tail: key(2),
                    junction: attr(10)
                },
                PropagationStep {
                    head: key(1),
                    tail: key(3),
                    junction: attr(11)
                },
                PropagationStep {
                    head: key(2),
                    tail: key(4),
                    junction: attr(12)
                },
            ]
        );
        // walking again starts over
        assert_eq!(g.bfs_edges(key(1)).unwrap().count(), 3);
    }

    #[test]
    fn test_bfs_from_middle_and_isolated() {
        let g = diamond();
        let tails: Vec<_> = g.bfs_edges(key(4)).unwrap().map(|s| s.tail).collect();
        assert_eq!(tails, vec![key(2), key(3), key(1)]);
        assert_eq!(g.bfs_edges(key(5)).unwrap().count(), 0);
        assert!(matches!(g.bfs_edges(key(9)), Err(LensError::Metadata(_))));
    }

    #[test]
    fn test_explain_tree() {
        let g = diamond();
        assert_eq!(
            g.explain(key(1)).unwrap().to_string(),
            "a\n├─ b (via ab)\n│  └─ d (via bd)\n└─ c (via ac)\n"
        );
    }

    #[tokio::test]
    async fn test_build_from_metadata() {
        let fx = supply_fixture().await.unwrap();
        let g = AssociativeGraph::build(fx.metadata.as_ref(), 1).await.unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(
            g.neighbors(fx.catalog).unwrap(),
            vec![(fx.supplier, fx.sid), (fx.part, fx.pid)]
        );
        let steps: Vec<_> = g.bfs_edges(fx.supplier).unwrap().collect();
        assert_eq!(steps.len(), 2);
        assert_eq!((steps[0].tail, steps[0].junction), (fx.catalog, fx.sid));
        assert_eq!(
            (steps[1].head, steps[1].tail, steps[1].junction),
            (fx.catalog, fx.part, fx.pid)
        );
    }
}
