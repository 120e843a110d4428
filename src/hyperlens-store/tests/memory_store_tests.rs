//! Integration tests for the memory store over the supply model.

use hyperlens_core::{EntityKey, Value};
use hyperlens_store::test_utils::{RecordingStore, SupplyFixture, supply_fixture};
use hyperlens_store::{
    AggregateFn, AtomSource, AttributeScope, CollectionKind, Column, ColumnarStore, Operand,
    OrderKey, Predicate, Projection, Query, RowSelection, RowSource, Selection, Statement,
};

async fn fixture() -> SupplyFixture {
    supply_fixture().await.unwrap()
}

async fn scope(fx: &SupplyFixture, attribute: hyperlens_core::AttributeKey, owner: EntityKey) -> AttributeScope {
    use hyperlens_core::MetadataStore;
    let attr = fx.metadata.get_attribute(attribute).await.unwrap();
    AttributeScope::new(&attr, owner)
}

async fn count(fx: &SupplyFixture, scope: AttributeScope, kind: CollectionKind) -> u64 {
    fx.store
        .query(
            &Query::CollectionCount {
                scope,
                kind,
                filtered: false,
                total: false,
                predicate: None,
                rows_table: None,
            },
            "Counting",
        )
        .await
        .unwrap()
        .scalar_u64()
        .unwrap()
}

#[tokio::test]
async fn test_unfiltered_collection_counts() {
    let fx = fixture().await;
    let country = scope(&fx, fx.country, fx.supplier).await;
    assert_eq!(count(&fx, country.clone(), CollectionKind::Set).await, 4);
    assert_eq!(count(&fx, country.clone(), CollectionKind::Bag).await, 6);
    assert_eq!(count(&fx, country, CollectionKind::Val).await, 6);
}

#[tokio::test]
async fn test_junction_counts_are_scoped_to_owner() {
    let fx = fixture().await;
    let from_supplier = scope(&fx, fx.sid, fx.supplier).await;
    let from_catalog = scope(&fx, fx.sid, fx.catalog).await;
    assert_eq!(count(&fx, from_supplier, CollectionKind::Bag).await, 6);
    assert_eq!(count(&fx, from_catalog.clone(), CollectionKind::Bag).await, 12);
    assert_eq!(count(&fx, from_catalog, CollectionKind::Set).await, 6);
}

#[tokio::test]
async fn test_counted_values_follow_predicate() {
    let fx = fixture().await;
    let country = scope(&fx, fx.country, fx.supplier).await;
    let result = fx
        .store
        .query(
            &Query::CollectionCount {
                scope: country,
                kind: CollectionKind::Val,
                filtered: false,
                total: false,
                predicate: Some(Predicate::Like {
                    operand: Operand::Value,
                    pattern: "%a%".to_string(),
                    negated: false,
                }),
                rows_table: None,
            },
            "Counting",
        )
        .await
        .unwrap();
    // Brazil twice, Argentina once
    assert_eq!(result.scalar_u64().unwrap(), 3);
}

#[tokio::test]
async fn test_projection_ordered_by_frequency() {
    let fx = fixture().await;
    let projection = Projection {
        scope: scope(&fx, fx.country, fx.supplier).await,
        columns: vec![Column::Value, Column::Count],
        source: AtomSource::Atoms,
        excluded: None,
        predicate: None,
        order: vec![
            OrderKey {
                column: Column::Count,
                descending: true,
            },
            OrderKey {
                column: Column::Value,
                descending: true,
            },
        ],
        limit: Some((3, 0)),
    };
    let result = fx
        .store
        .query(&Query::Project(projection), "Projection")
        .await
        .unwrap();
    assert_eq!(result.column_names(), vec!["val", "cnt"]);
    let values = result.column_values("val").unwrap();
    assert_eq!(
        values,
        vec![Value::from("USA"), Value::from("Brazil"), Value::from("Mexico")]
    );
    let counts = result.u32_column("cnt").unwrap();
    assert_eq!(counts, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_states_projection_requires_states_source() {
    let fx = fixture().await;
    let projection = Projection {
        scope: scope(&fx, fx.country, fx.supplier).await,
        columns: vec![Column::Value, Column::Selected],
        source: AtomSource::Atoms,
        excluded: None,
        predicate: None,
        order: Vec::new(),
        limit: None,
    };
    let err = fx
        .store
        .query(&Query::Project(projection), "Projection")
        .await
        .unwrap_err();
    assert!(err.is_execution());
}

#[tokio::test]
async fn test_sum_and_average_of_costs() {
    let fx = fixture().await;
    let cost = scope(&fx, fx.cost, fx.catalog).await;
    let sum = fx
        .store
        .query(
            &Query::Aggregate {
                scope: cost.clone(),
                func: AggregateFn::Sum,
                predicate: None,
            },
            "Sum",
        )
        .await
        .unwrap()
        .scalar_f64()
        .unwrap()
        .unwrap();
    assert!((sum - 311.44).abs() < 1e-6);

    let cheap = fx
        .store
        .query(
            &Query::Aggregate {
                scope: cost,
                func: AggregateFn::Avg,
                predicate: Some(Predicate::Between {
                    operand: Operand::Value,
                    low: Value::from(10.0),
                    high: Value::from(12.0),
                    negated: false,
                }),
            },
            "Average",
        )
        .await
        .unwrap()
        .scalar_f64()
        .unwrap()
        .unwrap();
    assert!((cheap - (11.70 + 11.10) / 2.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_junction_rows_through_memory_table() {
    let fx = fixture().await;
    let store = &fx.store;
    store
        .execute(
            &Statement::CreateMemoryTable {
                name: "FLT_1_1_MEM_ha1".to_string(),
                column: "ha1".to_string(),
            },
            "Create",
        )
        .await
        .unwrap();
    let brazilian_sids = Projection {
        scope: scope(&fx, fx.sid, fx.supplier).await,
        columns: vec![Column::ValueId],
        source: AtomSource::Atoms,
        excluded: None,
        predicate: Some(Predicate::In {
            operand: Operand::Value,
            values: vec![Value::from(3u32), Value::from(6u32)],
            negated: false,
        }),
        order: Vec::new(),
        limit: None,
    };
    store
        .execute(
            &Statement::InsertInto {
                table: "FLT_1_1_MEM_ha1".to_string(),
                source: Query::Project(brazilian_sids),
            },
            "Insert",
        )
        .await
        .unwrap();

    let rows = store
        .query(
            &Query::SelectRows(RowSelection {
                selections: vec![Selection {
                    scope: scope(&fx, fx.sid, fx.catalog).await,
                    predicate: Some(Predicate::InTable {
                        operand: Operand::ValueId,
                        table: "FLT_1_1_MEM_ha1".to_string(),
                        negated: false,
                    }),
                }],
                within: None,
            }),
            "Selection",
        )
        .await
        .unwrap();
    assert_eq!(rows.u32_column("hb1").unwrap(), vec![5, 6, 7, 10, 11]);
}

#[tokio::test]
async fn test_row_count_sources() {
    let fx = fixture().await;
    let links = fx
        .store
        .query(
            &Query::RowCount {
                entity: fx.catalog,
                source: RowSource::Links { exact: true },
            },
            "Row count",
        )
        .await
        .unwrap();
    assert_eq!(links.scalar_u64().unwrap(), 12);

    let missing = fx
        .store
        .query(
            &Query::TableExists {
                name: "FLT_1_3_VW_pos".to_string(),
            },
            "Exists",
        )
        .await
        .unwrap();
    assert_eq!(missing.scalar_u64().unwrap(), 0);
}

#[tokio::test]
async fn test_recording_store_labels_calls() {
    let fx = fixture().await;
    let store = RecordingStore::new(fx.store.clone());
    store
        .query(
            &Query::RowCount {
                entity: fx.part,
                source: RowSource::Links { exact: false },
            },
            "Row count",
        )
        .await
        .unwrap();
    store
        .execute(&Statement::ResetStates { model: 1 }, "Reset")
        .await
        .unwrap();
    let calls = store.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].query_id, "Row count");
    assert_eq!(calls[0].target, Some(fx.part));
    assert!(!calls[0].write);
    assert!(calls[1].write && calls[1].target.is_none());
    store.clear().await;
    assert!(store.calls().await.is_empty());
}
