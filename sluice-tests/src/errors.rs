use crate::silent_logs;
use sluice::{Connection, DbError, ErrorKind, ErrorOrigin};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const BROKEN_QUERY: &str = "SELEC 1 FORM nowhere";

pub async fn errors(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    let result;
    silent_logs! {
        result = connection.prepare::<(), ()>(BROKEN_QUERY);
    }
    let error = result.expect_err("The query is not valid");
    let value = error
        .downcast_ref::<DbError>()
        .expect("Prepare failures are database errors");
    assert_eq!(value.kind(), ErrorKind::StatementPrepare);
    assert_eq!(value.origin(), ErrorOrigin::Statement);
    assert_ne!(value.code(), 0);
    assert!(!value.message().is_empty());
    assert!(
        format!("{:#}", error).contains(BROKEN_QUERY),
        "The context names the query"
    );

    // Still usable
    let echo = Arc::new(
        connection
            .prepare::<(String,), (String,)>(crate::concurrent::ECHO)
            .expect("Could not prepare the echo"),
    );
    let results = Arc::new(std::sync::Mutex::new(Vec::new()));
    echo.queue_future(Arc::new(("ok".into(),)), Some(results.clone()), None, None)
        .expect("Could not queue the echo")
        .await
        .expect("Could not run the echo");
    assert_eq!(*results.lock().unwrap(), [("ok".to_string(),)]);
}
