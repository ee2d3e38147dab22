use sluice::Connection;
use std::{
    sync::{Arc, LazyLock},
    thread,
};
use tokio::{sync::Mutex, task::JoinSet};

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const ECHO: &str = "SELECT ?";

pub async fn concurrent(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    let echo = Arc::new(
        connection
            .prepare::<(i64,), (i64,)>(ECHO)
            .expect("Could not prepare the echo"),
    );

    // Queued from many tasks, each invocation keeps its own storage
    let mut tasks = JoinSet::new();
    for value in 0..64i64 {
        let echo = echo.clone();
        tasks.spawn(async move {
            let results = Arc::new(std::sync::Mutex::new(Vec::new()));
            echo.queue_future(Arc::new((value * 3,)), Some(results.clone()), None, None)
                .expect("Could not queue the echo")
                .await
                .expect("Could not run the echo");
            let results = results.lock().unwrap();
            assert_eq!(*results, [(value * 3,)]);
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("Echo task panicked");
    }

    // Synchronous calls from plain threads on the same statement
    thread::scope(|scope| {
        for value in 0..8i64 {
            let echo = &echo;
            scope.spawn(move || {
                for i in 0..16 {
                    let rows = echo
                        .fetch_all(&(value * 100 + i,))
                        .expect("Could not run the echo");
                    assert_eq!(rows, [(value * 100 + i,)]);
                }
            });
        }
    });
}
