//! Associative filtering engine for hyperlens.
//!
//! This crate turns value selections on one entity into filtered row sets on
//! every entity reachable from it through junction attributes.

#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
#![allow(clippy::doc_markdown)] // Documentation backticks are sometimes unnecessary
#![allow(clippy::cast_possible_truncation)] // Limits are small
#![allow(clippy::module_name_repetitions)]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ select  ┌─────────────────────┐ filter  ┌──────────────┐
//! │ QueryBuilder │ ──────▶ │ AssociativeEntitySet│ ──────▶ │ ColumnarStore│
//! │ (collection) │         │   (start entity)    │         │              │
//! └──────────────┘         └─────────────────────┘         └──────────────┘
//!                                     │ bfs_edges
//!                                     ▼
//!                          ┌─────────────────────┐
//!                          │ AssociativeGraph    │ ── derived selections
//!                          │ (junction edges)    │    on each tail entity
//!                          └─────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`QueryBuilder`]: immutable builder of counts, projections, selections
//!   and aggregates over one attribute
//! - [`AttributeValueCollection`]: the values of one attribute as seen from
//!   one owning entity
//! - [`AssociativeEntitySet`]: pending selections, double-buffered row sets
//!   and counts of one entity
//! - [`AssociativeGraph`]: entities joined by junction attributes, walked
//!   breadth first
//! - [`FilterEngine`]: owns the sets and the graph, and propagates every
//!   filter along the graph
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut engine = FilterEngine::new(1, metadata, store, EngineConfig::default()).await?;
//! let country = engine.collection("country", None).await?;
//! let brazil = country.query().select().where_("$v")?.in_(vec![Value::from("Brazil")])?;
//! for report in engine.filter(&brazil).await? {
//!     println!("{report}");
//! }
//! ```

pub mod collection;
pub mod cql;
pub mod engine;
pub mod entity_set;
pub mod graph;
pub mod selection;

pub use collection::{AttributeRef, AttributeValueCollection};
pub use cql::QueryBuilder;
pub use engine::{
    EntityItemCounts, FilterEngine, FilterReport, FilterValues, ItemsRequest, Transition,
};
pub use entity_set::{
    AssociativeEntitySet, AttributeCount, CountOrder, EntityCounts, FilterMode, SetState,
};
pub use graph::{AssociativeGraph, BfsEdges, EntityNode, JunctionEdge, PropagationStep};
pub use selection::{SelectionDescriptor, load_selections, save_selections};
