//! Test utilities: model fixtures, a recording store and a scripted SQL
//! transport.
//!
//! Only available with the `test-utils` feature.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use common_error::LensResult;
use hyperlens_core::{
    AttributeKey, Catalog, EntityKey, InMemoryMetadata, ModelId, RowId, Value, ValueType,
};

use crate::memory::MemoryStore;
use crate::query::{Query, Statement};
use crate::result::{QueryStats, ResultSet};
use crate::sql::{SqlResponse, SqlTransport, Summary};
use crate::store::ColumnarStore;

// ============================================================================
// Model fixtures
// ============================================================================

/// Builder of a data model together with the rows loaded into a
/// [`MemoryStore`].
#[derive(Debug)]
pub struct ModelFixture {
    catalog: Catalog,
    model: ModelId,
    rows: Vec<(EntityKey, RowId, Vec<(AttributeKey, Value)>)>,
}

/// Metadata and store produced by a [`ModelFixture`].
#[derive(Debug, Clone)]
pub struct Fixture {
    pub metadata: Arc<InMemoryMetadata>,
    pub store: Arc<MemoryStore>,
}

impl ModelFixture {
    /// Start a fixture for one data model.
    pub fn new(model: ModelId, alias: &str) -> LensResult<Self> {
        let mut catalog = Catalog::new();
        catalog.add_data_model(model, alias, alias)?;
        Ok(Self {
            catalog,
            model,
            rows: Vec::new(),
        })
    }

    /// Add an entity.
    pub fn entity(&mut self, alias: &str) -> LensResult<EntityKey> {
        self.catalog.add_entity(self.model, alias, alias)
    }

    /// Add an attribute owned by `entity`.
    pub fn attribute(
        &mut self,
        entity: EntityKey,
        alias: &str,
        value_type: ValueType,
    ) -> LensResult<AttributeKey> {
        self.catalog.add_attribute(entity, alias, alias, value_type)
    }

    /// Add a junction attribute between two entities.
    pub fn junction(
        &mut self,
        left: EntityKey,
        right: EntityKey,
        alias: &str,
        value_type: ValueType,
    ) -> LensResult<AttributeKey> {
        self.catalog.add_junction(left, right, alias, alias, value_type)
    }

    /// Queue one row of an entity.
    pub fn row(&mut self, entity: EntityKey, row: RowId, values: &[(AttributeKey, Value)]) {
        self.rows.push((entity, row, values.to_vec()));
    }

    /// The catalog built so far.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load the queued rows and hand out the metadata and store.
    pub async fn build(self) -> LensResult<Fixture> {
        let store = MemoryStore::new();
        for (entity, row, values) in &self.rows {
            store.insert_row(*entity, *row, values).await?;
        }
        Ok(Fixture {
            metadata: Arc::new(InMemoryMetadata::new(self.catalog)),
            store: Arc::new(store),
        })
    }
}

/// The supplier/part/catalog model with its keys.
#[derive(Debug, Clone)]
pub struct SupplyFixture {
    pub metadata: Arc<InMemoryMetadata>,
    pub store: Arc<MemoryStore>,
    pub supplier: EntityKey,
    pub part: EntityKey,
    pub catalog: EntityKey,
    pub sname: AttributeKey,
    pub country: AttributeKey,
    pub pname: AttributeKey,
    pub color: AttributeKey,
    pub cost: AttributeKey,
    pub sid: AttributeKey,
    pub pid: AttributeKey,
}

/// Suppliers: `(sid, name, country)`.
pub const SUPPLIERS: [(u32, &str, &str); 6] = [
    (1, "Acme Widget Suppliers", "USA"),
    (2, "Big Red Tool and Die", "USA"),
    (3, "Perfunctory Parts", "Brazil"),
    (4, "Alien Aircaft Inc.", "Mexico"),
    (5, "Ferdinand's", "Argentina"),
    (6, "Samba Components", "Brazil"),
];

/// Parts: `(pid, name, color)`.
pub const PARTS: [(u32, &str, &str); 6] = [
    (1, "Left Handed Bacon Stretcher Cover", "Red"),
    (2, "Smoke Shifter End", "Black"),
    (3, "Acme Widget Washer", "Red"),
    (4, "I Brake for Crop Circles Sticker", "Silver"),
    (5, "Anti-Gravity Turbine Generator", "Cyan"),
    (6, "Fire Hydrant Cap", "Red"),
];

/// Catalog entries: `(sid, pid, cost)`.
pub const CATALOG: [(u32, u32, f64); 12] = [
    (1, 1, 36.10),
    (1, 2, 42.30),
    (2, 3, 15.30),
    (2, 5, 20.50),
    (3, 1, 16.50),
    (3, 4, 7.95),
    (3, 6, 11.70),
    (4, 2, 55.00),
    (5, 5, 65.00),
    (6, 6, 9.99),
    (6, 3, 11.10),
    (1, 6, 20.00),
];

/// Build the supplier/part/catalog model as data model `1`.
pub async fn supply_fixture() -> LensResult<SupplyFixture> {
    let mut fixture = ModelFixture::new(1, "supply")?;
    let supplier = fixture.entity("supplier")?;
    let part = fixture.entity("part")?;
    let catalog = fixture.entity("catalog")?;
    let sname = fixture.attribute(supplier, "sname", ValueType::String)?;
    let country = fixture.attribute(supplier, "country", ValueType::String)?;
    let pname = fixture.attribute(part, "pname", ValueType::String)?;
    let color = fixture.attribute(part, "color", ValueType::String)?;
    let cost = fixture.attribute(catalog, "cost", ValueType::Float32)?;
    let sid = fixture.junction(supplier, catalog, "sid", ValueType::UInt32)?;
    let pid = fixture.junction(part, catalog, "pid", ValueType::UInt32)?;

    for (id, name, origin) in SUPPLIERS {
        fixture.row(
            supplier,
            id,
            &[
                (sid, Value::from(id)),
                (sname, Value::from(name)),
                (country, Value::from(origin)),
            ],
        );
    }
    for (id, name, shade) in PARTS {
        fixture.row(
            part,
            id,
            &[
                (pid, Value::from(id)),
                (pname, Value::from(name)),
                (color, Value::from(shade)),
            ],
        );
    }
    for (row, (s, p, price)) in (1..).zip(CATALOG) {
        fixture.row(
            catalog,
            row,
            &[
                (sid, Value::from(s)),
                (pid, Value::from(p)),
                (cost, Value::from(price)),
            ],
        );
    }

    let Fixture { metadata, store } = fixture.build().await?;
    Ok(SupplyFixture {
        metadata,
        store,
        supplier,
        part,
        catalog,
        sname,
        country,
        pname,
        color,
        cost,
        sid,
        pid,
    })
}

// ============================================================================
// RecordingStore
// ============================================================================

/// One call seen by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub query_id: String,
    pub target: Option<EntityKey>,
    /// Whether the call was a statement.
    pub write: bool,
}

/// Store wrapper recording the label and target of every call.
#[derive(Debug)]
pub struct RecordingStore<S> {
    inner: S,
    calls: Mutex<Vec<RecordedCall>>,
}

impl<S: ColumnarStore> RecordingStore<S> {
    /// Wrap a store.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls recorded so far.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Forget the recorded calls.
    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, query_id: &str, target: Option<EntityKey>, write: bool) {
        self.calls.lock().await.push(RecordedCall {
            query_id: query_id.to_string(),
            target,
            write,
        });
    }
}

#[async_trait]
impl<S: ColumnarStore> ColumnarStore for RecordingStore<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn query(&self, query: &Query, query_id: &str) -> LensResult<ResultSet> {
        self.record(query_id, query.target(), false).await;
        self.inner.query(query, query_id).await
    }

    async fn execute(&self, statement: &Statement, query_id: &str) -> LensResult<QueryStats> {
        self.record(query_id, statement.target(), true).await;
        self.inner.execute(statement, query_id).await
    }
}

// ============================================================================
// ScriptedTransport
// ============================================================================

/// SQL transport answering from a queue of canned responses.
///
/// Sent SQL is recorded. When the queue is empty an empty body is returned.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<SqlResponse>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    /// Create a transport with no queued response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response body with its result row count.
    pub async fn respond(&self, body: &str, result_rows: u64) {
        self.responses.lock().await.push_back(SqlResponse {
            body: body.to_string(),
            summary: Some(Summary {
                result_rows,
                ..Summary::default()
            }),
        });
    }

    /// `(query_id, sql)` pairs sent so far.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl SqlTransport for ScriptedTransport {
    async fn send(&self, sql: &str, query_id: &str) -> LensResult<SqlResponse> {
        self.sent
            .lock()
            .await
            .push((query_id.to_string(), sql.to_string()));
        Ok(self.responses.lock().await.pop_front().unwrap_or_default())
    }
}
