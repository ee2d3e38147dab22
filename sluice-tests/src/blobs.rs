use sluice::Connection;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const DELETE_BLOBS: &str = "DELETE FROM blobs";
pub const INSERT_BLOB: &str = "INSERT INTO blobs (payload, note) VALUES (?, ?)";
pub const SELECT_BLOB: &str = "SELECT payload, note FROM blobs WHERE id = ?";

pub async fn blobs(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    connection
        .prepare::<(), ()>(DELETE_BLOBS)
        .expect("Could not prepare the delete")
        .execute(&(), None, None, None)
        .expect("Could not delete the blobs");
    let insert = connection
        .prepare::<(Vec<u8>, String), ()>(INSERT_BLOB)
        .expect("Could not prepare the insert");
    let select = connection
        .prepare::<(u64,), (Vec<u8>, String)>(SELECT_BLOB)
        .expect("Could not prepare the select");

    for len in [0usize, 1, 100_000] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let note = "Grüße, 日本 🦀".repeat(len.min(400));
        let mut id = 0;
        insert
            .execute(
                &(payload.clone(), note.clone()),
                None,
                Some(&mut id),
                None,
            )
            .expect("Could not insert the blob");
        let mut row = (Vec::new(), String::new());
        assert!(
            select
                .execute_one(&(id,), &mut row)
                .expect("Could not select the blob")
        );
        assert_eq!(row.0.len(), len);
        assert_eq!(row.0, payload);
        assert_eq!(row.1, note);

        // Same row through the multi row path
        let rows = select
            .fetch_all(&(id,))
            .expect("Could not select the blob again");
        assert_eq!(rows, [(payload, note)]);
    }
}
