//! Integration tests for the metadata store interface.

use hyperlens_core::{
    BufferPair, Catalog, EntityKey, InMemoryMetadata, JunctionFilter, Keyed, MetadataStore,
    NodeKey, NodeKind, ValueType,
};

fn supply_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_data_model(1, "Supply", "supply").unwrap();
    let supplier = catalog.add_entity(1, "Supplier", "supplier").unwrap();
    let catalog_e = catalog.add_entity(1, "Catalog", "catalog").unwrap();
    catalog
        .add_attribute(supplier, "Country", "country", ValueType::String)
        .unwrap();
    catalog
        .add_attribute(catalog_e, "Cost", "cost", ValueType::Float32)
        .unwrap();
    catalog
        .add_junction(supplier, catalog_e, "Supplier Id", "sid", ValueType::UInt32)
        .unwrap();
    catalog
}

#[tokio::test]
async fn test_lookup_through_store() {
    let store = InMemoryMetadata::new(supply_catalog());

    let model = store.data_model(1).await.unwrap();
    assert_eq!(model.alias, "supply");

    let entities = store.entities(1).await.unwrap();
    let aliases: Vec<_> = entities.iter().map(|e| e.alias.as_str()).collect();
    assert_eq!(aliases, vec!["supplier", "catalog"]);

    let sid = store.find_attribute(1, "sid").await.unwrap();
    assert!(sid.junction);
    let (left, right) = store.junction_partners(sid.key).await.unwrap();
    assert_eq!(left, EntityKey::new(1, 1));
    assert_eq!(right, EntityKey::new(1, 2));

    let node = store.get_node(NodeKey::Attribute(sid.key)).await.unwrap();
    assert_eq!(node.kind(), NodeKind::Attribute);
}

#[tokio::test]
async fn test_attributes_of_filters_junctions() {
    let store = InMemoryMetadata::new(supply_catalog());
    let catalog_e = store.find_entity(1, "catalog").await.unwrap();

    let plain = store
        .attributes_of(catalog_e.key, JunctionFilter::Exclude)
        .await
        .unwrap();
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].alias, "cost");

    let junctions = store
        .attributes_of(catalog_e.key, JunctionFilter::Only)
        .await
        .unwrap();
    assert_eq!(junctions.len(), 1);
    assert_eq!(junctions[0].alias, "sid");
}

#[tokio::test]
async fn test_buffers_persist_across_reads() {
    let store = InMemoryMetadata::new(supply_catalog());
    let supplier = store.find_entity(1, "supplier").await.unwrap();
    assert_eq!(supplier.buffers, BufferPair::initial(supplier.key));

    let swapped = supplier.buffers.swapped();
    store.set_buffers(supplier.key, swapped.clone()).await.unwrap();

    let reread = store.get_entity(supplier.key).await.unwrap();
    assert_eq!(reread.buffers, swapped);
    assert!(reread.buffers.is_distinct());
}

#[tokio::test]
async fn test_unknown_keys_are_metadata_errors() {
    let store = InMemoryMetadata::new(supply_catalog());
    let err = store.get_entity(EntityKey::new(1, 42)).await.unwrap_err();
    assert!(err.to_string().starts_with("MetadataError"));
    assert!(store.find_entity(2, "supplier").await.is_err());
}

#[tokio::test]
async fn test_update_edits_the_live_catalog() {
    let store = InMemoryMetadata::new(supply_catalog());
    let part = store
        .update(|catalog| catalog.add_entity(1, "Part", "part"))
        .await
        .unwrap();
    assert_eq!(store.find_entity(1, "part").await.unwrap().key, part);
    assert_eq!(store.entities(1).await.unwrap().len(), 3);
}

#[test]
fn test_date_helpers_are_exported() {
    use hyperlens_core::{format_date, parse_date};

    assert_eq!(parse_date("1970-01-02"), Some(1));
    assert_eq!(format_date(parse_date("2024-02-29").unwrap()), "2024-02-29");
    assert_eq!(parse_date("29/02/2024"), None);
}
