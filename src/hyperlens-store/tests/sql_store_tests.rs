//! Tests of the SQL store against a scripted transport.

use hyperlens_core::{EntityKey, Value, ValueType};
use hyperlens_store::test_utils::ScriptedTransport;
use hyperlens_store::{
    AttributeScope, CollectionKind, ColumnarStore, Operand, Predicate, Query, RowSelection,
    RowSource, Selection, SqlStore, Statement,
};

fn country() -> AttributeScope {
    AttributeScope {
        model: 1,
        attribute: 5,
        value_type: ValueType::String,
        owner: 1,
        junction: false,
    }
}

#[tokio::test]
async fn test_count_reads_tsv_scalar() {
    let store = SqlStore::new(ScriptedTransport::new());
    store.transport().respond("cnt\nUInt64\n4\n", 1).await;
    let result = store
        .query(
            &Query::CollectionCount {
                scope: country(),
                kind: CollectionKind::Set,
                filtered: true,
                total: false,
                predicate: None,
                rows_table: None,
            },
            "Counting",
        )
        .await
        .unwrap();
    assert_eq!(result.scalar_u64().unwrap(), 4);
    assert_eq!(result.stats().rows, 1);

    let sent = store.transport().sent().await;
    assert_eq!(sent.len(), 1);
    let (query_id, sql) = &sent[0];
    assert_eq!(query_id, "Counting");
    assert_eq!(
        sql,
        "SELECT count() AS cnt\nFROM HAtom_1States\nWHERE ha2=5 AND pos=1"
    );
}

#[tokio::test]
async fn test_row_selection_reads_ids() {
    let store = SqlStore::new(ScriptedTransport::new());
    store
        .transport()
        .respond("hb1\nUInt32\n3\n6\n", 2)
        .await;
    let result = store
        .query(
            &Query::SelectRows(RowSelection {
                selections: vec![Selection {
                    scope: country(),
                    predicate: Some(Predicate::In {
                        operand: Operand::Value,
                        values: vec![Value::from("Brazil")],
                        negated: false,
                    }),
                }],
                within: Some("FLT_1_1_MEM_Z".to_string()),
            }),
            "Selection",
        )
        .await
        .unwrap();
    assert_eq!(result.u32_column("hb1").unwrap(), vec![3, 6]);

    let sent = store.transport().sent().await;
    let sql = &sent[0].1;
    assert!(sql.contains("arrayJoin(hb1arr)"));
    assert!(sql.contains("val IN ('Brazil')"));
    assert!(sql.contains("WHERE hb1 IN FLT_1_1_MEM_Z"));
}

#[tokio::test]
async fn test_statements_expand_to_several_sql_statements() {
    let store = SqlStore::new(ScriptedTransport::new());
    let entity = EntityKey::new(1, 1);
    store
        .execute(
            &Statement::ClearStates {
                entity,
                attributes: vec![4, 5],
            },
            "Clear states",
        )
        .await
        .unwrap();
    store
        .execute(
            &Statement::MarkSelected {
                entity,
                view: "FLT_1_1_VW_sel".to_string(),
                selections: Vec::new(),
            },
            "Selected",
        )
        .await
        .unwrap();
    store
        .execute(
            &Statement::RefreshPositions {
                entity,
                rows_table: "FLT_1_1_MEM_X".to_string(),
                view: "FLT_1_1_VW_pos".to_string(),
            },
            "Positions",
        )
        .await
        .unwrap();

    let sent = store.transport().sent().await;
    let labels: Vec<&str> = sent.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Clear states",
            "Clear states",
            "Positions",
            "Positions",
            "Positions",
            "Positions"
        ]
    );
    assert!(sent[0].1.starts_with("ALTER TABLE HAtom_1States CLEAR COLUMN hb1arr IN PARTITION (1, 4)"));
    assert_eq!(sent[2].1, "DROP TABLE IF EXISTS FLT_1_1_VW_pos");
    assert_eq!(sent[5].1, "OPTIMIZE TABLE HAtom_1States FINAL");
}

#[tokio::test]
async fn test_estimated_row_count_uses_uniq() {
    let store = SqlStore::new(ScriptedTransport::new());
    store.transport().respond("cnt\nUInt64\n12\n", 1).await;
    let rows = store
        .query(
            &Query::RowCount {
                entity: EntityKey::new(1, 3),
                source: RowSource::Links { exact: false },
            },
            "Row count",
        )
        .await
        .unwrap()
        .scalar_u64()
        .unwrap();
    assert_eq!(rows, 12);
    let sent = store.transport().sent().await;
    assert_eq!(sent[0].1, "SELECT uniq(hb1) AS cnt\nFROM HLink_1\nWHERE hb2=3");
}

#[tokio::test]
async fn test_states_projection_from_atoms_is_rejected_before_sending() {
    let store = SqlStore::new(ScriptedTransport::new());
    let err = store
        .query(
            &Query::Project(hyperlens_store::Projection {
                scope: country(),
                columns: vec![hyperlens_store::Column::Position],
                source: hyperlens_store::AtomSource::Atoms,
                excluded: None,
                predicate: None,
                order: Vec::new(),
                limit: None,
            }),
            "Projection",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, common_error::LensError::Operation(_)));
    assert!(store.transport().sent().await.is_empty());
}
