//! Concurrent insert tests for Docket sessions
//!
//! Fans independent inserts out over threads and blocking tasks, then checks
//! that every committed document is visible and indexed exactly once.

use docket_document::{Database, DocumentKey};
use serde_json::json;
use std::collections::HashSet;

const WORKERS: usize = 8;
const PER_WORKER: usize = 25;

fn office_index() -> serde_json::Value {
    json!({ "name": "OFFICE_IDX", "fields": [ { "path": "office" } ] })
}

#[test]
fn test_concurrent_inserts_from_threads() {
    let db = Database::in_memory();
    let session = db.session();
    let coll = session
        .create_collection("emp")
        .expect("create should succeed");
    coll.create_index(Some(&office_index()))
        .expect("create index should succeed");

    std::thread::scope(|scope| {
        for worker in 0..WORKERS {
            let coll = coll.clone();
            scope.spawn(move || {
                for i in 0..PER_WORKER {
                    let office = if i % 2 == 0 { "Shenzhen" } else { "London" };
                    coll.insert_one(json!({ "worker": worker, "seq": i, "office": office }))
                        .expect("insert should succeed");
                }
            });
        }
    });

    assert_eq!(session.pending(), WORKERS * PER_WORKER);
    session.commit().expect("commit should succeed");

    let reader = db.session().open_collection("emp").expect("open");
    let total = WORKERS * PER_WORKER;
    assert_eq!(reader.find().count().expect("count").count, total);

    let shenzhen = json!({ "office": "Shenzhen" });
    let london = json!({ "office": "London" });
    let shenzhen_count = reader.find().filter(&shenzhen).count().expect("count").count;
    let london_count = reader.find().filter(&london).count().expect("count").count;
    assert_eq!(shenzhen_count, WORKERS * PER_WORKER.div_ceil(2));
    assert_eq!(shenzhen_count + london_count, total);

    let keys: HashSet<DocumentKey> = reader
        .find()
        .filter(&shenzhen)
        .get_documents()
        .expect("query")
        .into_iter()
        .map(|doc| doc.key().clone())
        .collect();
    assert_eq!(keys.len(), shenzhen_count);
}

#[test]
fn test_concurrent_sessions_commit_independently() {
    let db = Database::in_memory();
    db.session()
        .create_collection("emp")
        .expect("create should succeed")
        .create_index(Some(&office_index()))
        .expect("create index should succeed");

    std::thread::scope(|scope| {
        for worker in 0..WORKERS {
            let db = db.clone();
            scope.spawn(move || {
                let session = db.session();
                let coll = session.open_collection("emp").expect("open");
                for i in 0..PER_WORKER {
                    coll.insert_one(json!({ "worker": worker, "seq": i, "office": "Bangalore" }))
                        .expect("insert should succeed");
                }
                session.commit().expect("commit should succeed");
            });
        }
    });

    let coll = db.session().open_collection("emp").expect("open");
    let filter = json!({ "office": "Bangalore" });
    assert_eq!(
        coll.find().filter(&filter).count().expect("count").count,
        WORKERS * PER_WORKER
    );
    assert_eq!(db.stats().commits, WORKERS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_from_blocking_tasks() {
    let db = Database::in_memory();
    let session = db.session();
    let coll = session
        .create_collection("emp")
        .expect("create should succeed");
    coll.create_index(Some(&office_index()))
        .expect("create index should succeed");

    let mut tasks = Vec::new();
    for worker in 0..WORKERS {
        let coll = coll.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            coll.insert_one(json!({ "worker": worker, "office": "Melbourne" }))
                .expect("insert should succeed")
        }));
    }

    let mut keys = HashSet::new();
    for task in tasks {
        let meta = task.await.expect("task should not panic");
        assert!(keys.insert(meta.key));
    }
    session.commit().expect("commit should succeed");

    let filter = json!({ "office": "Melbourne" });
    let docs = coll
        .find()
        .filter(&filter)
        .get_documents()
        .expect("query");
    assert_eq!(docs.len(), WORKERS);
    for doc in docs {
        assert!(keys.contains(doc.key()));
        assert!(doc.version().is_committed());
    }
}
