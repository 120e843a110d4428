//! Sample data for playground examples.
//!
//! The demo model is the classic suppliers and parts database: a
//! `supplier` and a `part` entity joined through the `catalog` entity by the
//! `sid` and `pid` junction attributes.

use std::sync::Arc;

use common_error::LensResult;
use hyperlens_core::{AttributeKey, Catalog, EntityKey, InMemoryMetadata, ModelId, Value, ValueType};
use hyperlens_store::MemoryStore;

/// Id of the demo data model.
pub const DEMO_MODEL: ModelId = 1;

const SUPPLIERS: [(u32, &str, &str, &str); 8] = [
    (1, "Acme Widget Suppliers", "1 Grub St., Potemkin Village, IL 61801", "USA"),
    (2, "Big Red Tool and Die", "4 My Way, Bermuda Shorts, OR 90305", "USA"),
    (3, "Perfunctory Parts", "99999 Short Pier, Terra Del Fuego, TX 41299", "Brazil"),
    (4, "Alien Aircaft Inc.", "2 Groom Lake, Rachel, NV 51902", "Mexico"),
    (5, "Ferdinand's", "Via Paranoia 14, Buenos Aires", "Argentina"),
    (6, "Samba Components", "Rua do Ouvidor 12, Rio de Janeiro", "Brazil"),
    (7, "Northwind Fasteners", "88 Harbour Rd., Halifax, NS", "Canada"),
    (8, "Maple Machining", "3 Rue Sainte-Anne, Quebec, QC", "Canada"),
];

const PARTS: [(u32, &str, &str, f64); 9] = [
    (1, "Left Handed Bacon Stretcher Cover", "Red", 0.25),
    (2, "Smoke Shifter End", "Black", 1.40),
    (3, "Acme Widget Washer", "Red", 0.05),
    (4, "I Brake for Crop Circles Sticker", "Silver", 0.01),
    (5, "Anti-Gravity Turbine Generator", "Cyan", 120.00),
    (6, "Fire Hydrant Cap", "Red", 3.20),
    (7, "7 Segment Display", "Green", 0.30),
    (8, "Flux Capacitor Housing", "Silver", 8.75),
    (9, "Left Handed Screwdriver", "Black", 0.80),
];

/// `(sid, pid, cost, quantity)`
const CATALOG: [(u32, u32, f64, u32); 16] = [
    (1, 1, 36.10, 120),
    (1, 2, 42.30, 40),
    (2, 3, 15.30, 300),
    (2, 5, 20.50, 2),
    (3, 1, 16.50, 75),
    (3, 4, 7.95, 1000),
    (3, 6, 11.70, 18),
    (4, 2, 55.00, 9),
    (5, 5, 65.00, 1),
    (6, 6, 9.99, 64),
    (6, 3, 11.10, 500),
    (1, 6, 20.00, 12),
    (7, 7, 4.10, 250),
    (7, 9, 6.25, 80),
    (8, 8, 31.00, 14),
    (8, 7, 3.95, 400),
];

/// Metadata and loaded store of the demo model.
#[derive(Debug, Clone)]
pub struct DemoModel {
    pub metadata: Arc<InMemoryMetadata>,
    pub store: Arc<MemoryStore>,
    pub supplier: EntityKey,
    pub part: EntityKey,
    pub catalog: EntityKey,
}

/// Keys registered by [`demo_catalog`].
#[derive(Debug, Clone, Copy)]
struct DemoKeys {
    supplier: EntityKey,
    part: EntityKey,
    catalog: EntityKey,
    sname: AttributeKey,
    address: AttributeKey,
    country: AttributeKey,
    pname: AttributeKey,
    color: AttributeKey,
    weight: AttributeKey,
    cost: AttributeKey,
    quantity: AttributeKey,
    sid: AttributeKey,
    pid: AttributeKey,
}

fn register(catalog: &mut Catalog) -> LensResult<DemoKeys> {
    catalog.add_data_model(DEMO_MODEL, "Suppliers and Parts", "supply")?;
    let supplier = catalog.add_entity(DEMO_MODEL, "Suppliers", "supplier")?;
    let part = catalog.add_entity(DEMO_MODEL, "Parts", "part")?;
    let catalog_entity = catalog.add_entity(DEMO_MODEL, "Catalog", "catalog")?;
    Ok(DemoKeys {
        supplier,
        part,
        catalog: catalog_entity,
        sname: catalog.add_attribute(supplier, "Supplier name", "sname", ValueType::String)?,
        address: catalog.add_attribute(supplier, "Address", "address", ValueType::String)?,
        country: catalog.add_attribute(supplier, "Country", "country", ValueType::String)?,
        pname: catalog.add_attribute(part, "Part name", "pname", ValueType::String)?,
        color: catalog.add_attribute(part, "Color", "color", ValueType::String)?,
        weight: catalog.add_attribute(part, "Weight", "weight", ValueType::Float32)?,
        cost: catalog.add_attribute(catalog_entity, "Cost", "cost", ValueType::Float32)?,
        quantity: catalog.add_attribute(catalog_entity, "Quantity", "quantity", ValueType::UInt32)?,
        sid: catalog.add_junction(supplier, catalog_entity, "Supplier id", "sid", ValueType::UInt32)?,
        pid: catalog.add_junction(part, catalog_entity, "Part id", "pid", ValueType::UInt32)?,
    })
}

/// Catalog of the demo model without any rows.
///
/// Use it as the metadata of a store that already holds the demo rows.
pub fn demo_catalog() -> LensResult<Catalog> {
    let mut catalog = Catalog::new();
    register(&mut catalog)?;
    Ok(catalog)
}

/// Build the demo model and load its rows into a [`MemoryStore`].
///
/// # Example
///
/// ```rust,ignore
/// let demo = create_supply_model().await?;
/// let engine = FilterEngine::new(DEMO_MODEL, demo.metadata, demo.store, EngineConfig::default()).await?;
/// ```
pub async fn create_supply_model() -> LensResult<DemoModel> {
    let mut catalog = Catalog::new();
    let keys = register(&mut catalog)?;
    let store = MemoryStore::new();

    for (id, name, address, country) in SUPPLIERS {
        store
            .insert_row(
                keys.supplier,
                id,
                &[
                    (keys.sid, Value::from(id)),
                    (keys.sname, Value::from(name)),
                    (keys.address, Value::from(address)),
                    (keys.country, Value::from(country)),
                ],
            )
            .await?;
    }
    for (id, name, color, weight) in PARTS {
        store
            .insert_row(
                keys.part,
                id,
                &[
                    (keys.pid, Value::from(id)),
                    (keys.pname, Value::from(name)),
                    (keys.color, Value::from(color)),
                    (keys.weight, Value::from(weight)),
                ],
            )
            .await?;
    }
    for (row, (sid, pid, cost, quantity)) in (1..).zip(CATALOG) {
        store
            .insert_row(
                keys.catalog,
                row,
                &[
                    (keys.sid, Value::from(sid)),
                    (keys.pid, Value::from(pid)),
                    (keys.cost, Value::from(cost)),
                    (keys.quantity, Value::from(quantity)),
                ],
            )
            .await?;
    }
    log::debug!(
        "demo model loaded: {} suppliers, {} parts, {} catalog rows",
        SUPPLIERS.len(),
        PARTS.len(),
        CATALOG.len()
    );

    Ok(DemoModel {
        metadata: Arc::new(InMemoryMetadata::new(catalog)),
        store: Arc::new(store),
        supplier: keys.supplier,
        part: keys.part,
        catalog: keys.catalog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperlens_core::{JunctionFilter, MetadataStore};

    #[test]
    fn test_demo_catalog_layout() {
        let catalog = demo_catalog().unwrap();
        let entities = catalog.entities(DEMO_MODEL).unwrap();
        assert_eq!(entities.len(), 3);
        let sid = catalog.find_attribute(DEMO_MODEL, "sid").unwrap();
        assert!(sid.junction);
        assert_eq!(sid.owners.len(), 2);
    }

    #[tokio::test]
    async fn test_supply_model_loads() {
        let demo = create_supply_model().await.unwrap();
        let junctions = demo
            .metadata
            .attributes_of(demo.catalog, JunctionFilter::Only)
            .await
            .unwrap();
        assert_eq!(junctions.len(), 2);
        let canada = demo
            .store
            .value_id(
                demo.metadata
                    .find_attribute(DEMO_MODEL, "country")
                    .await
                    .unwrap()
                    .key,
                &Value::from("Canada"),
            )
            .await;
        assert!(canada.is_some());
    }
}
