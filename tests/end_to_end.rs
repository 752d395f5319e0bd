//! End-to-end scenarios spanning catalogue -> schema -> entity -> index ->
//! kNN scan, the way an external query planner would drive the engine.

use cottontaildb::catalog::Catalog;
use cottontaildb::column::StorageVariant;
use cottontaildb::config::Config;
use cottontaildb::entity::ColumnDef;
use cottontaildb::execution::{parallel_entity_scan_knn, sequential_entity_scan_knn};
use cottontaildb::index::hash::file_name as index_file_name;
use cottontaildb::index::{ComparisonOp, Predicate};
use cottontaildb::knn::Metric;
use cottontaildb::value::{Value, ValueType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;
use uuid::Uuid;

/// Scenario 3: unique hash index round-trip over UUID keys paired with
/// high-dimensional vectors. Scaled down from the spec's 10^6 rows to keep
/// the test fast; the property checked is identical.
#[test]
fn unique_hash_index_round_trips_uuid_keys() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
    let schema = catalog.create_schema("public").unwrap();
    let entity = schema
        .create_entity(
            "vectors",
            vec![
                ColumnDef::new("id", ValueType::StringType, false),
                ColumnDef::new("embedding", ValueType::FloatVector(128), false),
            ],
        )
        .unwrap();
    entity.create_index("by_id", "id", true).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let rows: Vec<(String, Vec<f32>)> = (0..2000)
        .map(|_| {
            let id = Uuid::new_v4().to_string();
            let embedding: Vec<f32> = (0..128).map(|_| rng.random::<f32>()).collect();
            (id, embedding)
        })
        .collect();

    {
        let tx = entity.begin(None, false).unwrap();
        for (id, embedding) in &rows {
            tx.insert(vec![
                Some(Value::StringValue(id.clone())),
                Some(Value::FloatVector(embedding.clone())),
            ])
            .unwrap();
        }
        tx.commit().unwrap();
    }

    // Every inserted id resolves to exactly one record with matching vector.
    for (id, embedding) in rows.iter().take(50) {
        let tx = entity.begin(None, true).unwrap();
        let found = tx
            .filter(&Predicate::Compare {
                column: "id".to_string(),
                op: ComparisonOp::Equal,
                value: Value::StringValue(id.clone()),
            })
            .unwrap();
        assert_eq!(found.len(), 1, "expected exactly one match for {id}");
        assert_eq!(found[0].get("embedding"), Some(&Some(Value::FloatVector(embedding.clone()))));
    }

    // A random id that was never inserted returns nothing.
    let tx = entity.begin(None, true).unwrap();
    let miss = tx
        .filter(&Predicate::Compare {
            column: "id".to_string(),
            op: ComparisonOp::Equal,
            value: Value::StringValue(Uuid::new_v4().to_string()),
        })
        .unwrap();
    assert!(miss.is_empty());

    catalog.close().unwrap();
}

/// Scenario 4: a parallel kNN scan agrees with a single-threaded brute-force
/// scan over the same vectors, predicate, and k.
#[test]
fn parallel_knn_scan_matches_brute_force() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
    let schema = catalog.create_schema("public").unwrap();
    let entity = schema
        .create_entity("points", vec![ColumnDef::new("v", ValueType::FloatVector(64), false)])
        .unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    {
        let tx = entity.begin(None, false).unwrap();
        for _ in 0..3000 {
            let v: Vec<f32> = (0..64).map(|_| rng.random_range(-1.0f32..1.0)).collect();
            tx.insert(vec![Some(Value::FloatVector(v))]).unwrap();
        }
        tx.commit().unwrap();
    }

    let query: Vec<Vec<f64>> = vec![(0..64).map(|i| (i as f64) / 64.0).collect()];

    let tx = entity.begin(None, true).unwrap();
    let brute = sequential_entity_scan_knn("points", &tx, "v", &query, 10, Metric::L2, None).unwrap();
    let parallel = parallel_entity_scan_knn("points", &tx, "v", &query, 10, Metric::L2, None, 4).unwrap();

    assert_eq!(brute[0].tuple_ids, parallel[0].tuple_ids);
    for (a, b) in brute[0].rows.iter().zip(parallel[0].rows.iter()) {
        let (Some(Value::Double(da)), Some(Value::Double(db))) = (&a[0], &b[0]) else {
            panic!("expected double distance columns")
        };
        assert!((da - db).abs() < 1e-9);
    }

    catalog.close().unwrap();
}

/// Scenario 6: dropping an index after heavy write traffic leaves the
/// entity's row count and full-scan contents untouched, and removes the
/// index's on-disk directory.
#[test]
fn dropping_index_leaves_entity_consistent() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
    let schema = catalog.create_schema("public").unwrap();
    let entity = schema
        .create_entity("people", vec![ColumnDef::new("id", ValueType::Int, false)])
        .unwrap();
    entity.create_index("by_id", "id", true).unwrap();

    let index_path = dir
        .path()
        .join("schema_public")
        .join("entity_people")
        .join(index_file_name("by_id"));
    assert!(index_path.exists(), "create_index should have written {index_path:?}");

    {
        let tx = entity.begin(None, false).unwrap();
        for i in 0..1000 {
            tx.insert(vec![Some(Value::Int(i))]).unwrap();
        }
        tx.commit().unwrap();
    }
    assert!(index_path.exists(), "committed inserts should keep the index file on disk");

    entity.drop_index("by_id").unwrap();
    assert!(entity.index_names().is_empty());
    assert!(!index_path.exists(), "drop_index should remove the on-disk index file");

    let tx = entity.begin(None, true).unwrap();
    assert_eq!(tx.count().unwrap(), 1000);
    let mut seen = 0;
    tx.for_each(|_| {
        seen += 1;
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, 1000);
    drop(tx);

    catalog.close().unwrap();
}

/// Closing and reopening a catalogue preserves schemas, entities, row
/// counts, and index definitions across the boundary.
#[test]
fn catalog_reopen_preserves_entity_and_index_state() {
    let dir = tempdir().unwrap();
    {
        let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
        let schema = catalog.create_schema("public").unwrap();
        let entity = schema
            .create_entity(
                "people",
                vec![
                    ColumnDef::new("id", ValueType::Int, false),
                    ColumnDef::new("name", ValueType::StringType, true),
                ],
            )
            .unwrap();
        entity.create_index("by_id", "id", true).unwrap();
        let tx = entity.begin(None, false).unwrap();
        tx.insert(vec![Some(Value::Int(1)), Some(Value::StringValue("ada".into()))]).unwrap();
        tx.insert(vec![Some(Value::Int(2)), Some(Value::StringValue("grace".into()))]).unwrap();
        tx.commit().unwrap();
        catalog.close().unwrap();
    }

    let catalog = Catalog::open(dir.path(), Config::default(), StorageVariant::WriteAheadLogged).unwrap();
    let schema = catalog.schema("public").unwrap();
    let entity = schema.entity("people").unwrap();
    assert_eq!(entity.index_names(), vec!["by_id".to_string()]);

    let tx = entity.begin(None, true).unwrap();
    assert_eq!(tx.count().unwrap(), 2);
    let found = tx
        .filter(&Predicate::Compare {
            column: "id".to_string(),
            op: ComparisonOp::Equal,
            value: Value::Int(2),
        })
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name"), Some(&Some(Value::StringValue("grace".into()))));
}
