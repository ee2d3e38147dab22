use sluice::{Connection, InvocationState};
use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const DELETE_JOURNAL: &str = "DELETE FROM journal";
pub const INSERT_ENTRY: &str = "INSERT INTO journal (entry) VALUES (?)";
pub const SELECT_ENTRIES: &str = "SELECT id, entry FROM journal ORDER BY id";

pub async fn queued(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    let delete = Arc::new(
        connection
            .prepare::<(), ()>(DELETE_JOURNAL)
            .expect("Could not prepare the delete"),
    );
    delete
        .queue_future(Arc::new(()), None, None, None)
        .expect("Could not queue the delete")
        .await
        .expect("Could not delete the journal");

    // Callbacks fire in enqueue order
    let insert = Arc::new(
        connection
            .prepare::<(i64,), ()>(INSERT_ENTRY)
            .expect("Could not prepare the insert"),
    );
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut tickets = Vec::new();
    let mut ids = Vec::new();
    for entry in 0..50i64 {
        let order = order.clone();
        let id = Arc::new(AtomicU64::new(0));
        let ticket = insert
            .queue(
                Arc::new((entry,)),
                None,
                Some(id.clone()),
                None,
                move |completion| {
                    completion.expect("Could not insert the entry");
                    order.lock().unwrap().push(entry);
                },
            )
            .expect("Could not queue the insert");
        tickets.push(ticket);
        ids.push(id);
    }

    // The select waits for every insert before it
    let select = Arc::new(
        connection
            .prepare::<(), (u64, i64)>(SELECT_ENTRIES)
            .expect("Could not prepare the select"),
    );
    let results = Arc::new(std::sync::Mutex::new(Vec::new()));
    let rows = Arc::new(AtomicU64::new(0));
    select
        .queue_future(Arc::new(()), Some(results.clone()), None, Some(rows.clone()))
        .expect("Could not queue the select")
        .await
        .expect("Could not select the journal");

    assert!(tickets.iter().all(|v| v.state() == InvocationState::Completed));
    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
    assert_eq!(rows.load(Ordering::Acquire), 50);
    let results = results.lock().unwrap();
    assert_eq!(
        *results,
        ids.iter()
            .map(|v| v.load(Ordering::Acquire))
            .zip(0..50)
            .collect::<Vec<_>>()
    );
    assert_eq!(connection.pending(), 0);
}
