use indoc::indoc;
use sluice::Connection;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const DELETE_NUMBERS: &str = "DELETE FROM numbers";
pub const INSERT_NUMBER: &str = "INSERT INTO numbers (value) VALUES (?)";
pub const SELECT_PAGE: &str = indoc! {"
    SELECT SQL_CALC_FOUND_ROWS value
    FROM numbers
    WHERE value >= ?
    ORDER BY value
    LIMIT ?
"};
pub const SELECT_NUMBERS: &str = "SELECT value FROM numbers WHERE value >= ? ORDER BY value";

pub async fn found_rows(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    connection
        .prepare::<(), ()>(DELETE_NUMBERS)
        .expect("Could not prepare the delete")
        .execute(&(), None, None, None)
        .expect("Could not delete the numbers");
    let insert = connection
        .prepare::<(i32,), ()>(INSERT_NUMBER)
        .expect("Could not prepare the insert");
    for value in 0..25 {
        insert
            .execute(&(value,), None, None, None)
            .expect("Could not insert a number");
    }

    let page = connection
        .prepare::<(i32, u32), (i32,)>(SELECT_PAGE)
        .expect("Could not prepare the page");
    let mut values = Vec::new();
    let mut rows = 0;
    page.execute(&(5, 10), Some(&mut values), None, Some(&mut rows))
        .expect("Could not select the page");
    assert_eq!(values, (5..15).map(|v| (v,)).collect::<Vec<_>>());
    assert_eq!(rows, 20);
    assert_eq!(connection.found_rows().expect("Could not read found rows"), 20);

    // Without the hint the count is the rows fetched
    let numbers = connection
        .prepare::<(i32,), (i32,)>(SELECT_NUMBERS)
        .expect("Could not prepare the select");
    let mut rows = 0;
    numbers
        .execute(&(22,), None, None, Some(&mut rows))
        .expect("Could not select the numbers");
    assert_eq!(rows, 3);

    // Deleting reports the affected rows
    let mut deleted = 0;
    connection
        .prepare::<(), ()>(DELETE_NUMBERS)
        .expect("Could not prepare the delete")
        .execute(&(), None, None, Some(&mut deleted))
        .expect("Could not delete the numbers");
    assert_eq!(deleted, 25);
}
