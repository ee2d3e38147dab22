use indoc::indoc;
use sluice::{Connection, Record};
use std::sync::LazyLock;
use time::{
    Date, PrimitiveDateTime, Time,
    macros::{date, datetime, time},
};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const DELETE_EVENTS: &str = "DELETE FROM events";
pub const INSERT_EVENT: &str = "INSERT INTO events (title, happened_at, reminder) VALUES (?, ?, ?)";
pub const SELECT_EVENT: &str = indoc! {"
    SELECT title, DATE(happened_at), TIME(happened_at), happened_at, reminder
    FROM events
    WHERE id = ?
"};

#[derive(Record, Debug, PartialEq)]
struct Event(String, PrimitiveDateTime, Option<Time>);

#[derive(Record, Debug, PartialEq)]
struct EventParts {
    title: String,
    day: Date,
    at: Time,
    happened_at: PrimitiveDateTime,
    reminder: Option<Time>,
}

pub async fn temporal(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    connection
        .prepare::<(), ()>(DELETE_EVENTS)
        .expect("Could not prepare the delete")
        .execute(&(), None, None, None)
        .expect("Could not delete the events");
    let insert = connection
        .prepare::<Event, ()>(INSERT_EVENT)
        .expect("Could not prepare the insert");
    let select = connection
        .prepare::<(u64,), EventParts>(SELECT_EVENT)
        .expect("Could not prepare the select");

    let mut launch = 0;
    insert
        .execute(
            &Event(
                "launch".into(),
                datetime!(2024-02-29 23:59:58.25),
                Some(time!(8:30)),
            ),
            None,
            Some(&mut launch),
            None,
        )
        .expect("Could not insert the launch");
    let mut epoch = 0;
    insert
        .execute(
            &Event("epoch".into(), datetime!(1970-01-01 0:00), None),
            None,
            Some(&mut epoch),
            None,
        )
        .expect("Could not insert the epoch");

    let events = select.fetch_all(&(launch,)).expect("Could not select the launch");
    assert_eq!(
        events,
        [EventParts {
            title: "launch".into(),
            day: date!(2024 - 02 - 29),
            at: time!(23:59:58.25),
            happened_at: datetime!(2024-02-29 23:59:58.25),
            reminder: Some(time!(8:30)),
        }]
    );
    let events = select.fetch_all(&(epoch,)).expect("Could not select the epoch");
    assert_eq!(
        events,
        [EventParts {
            title: "epoch".into(),
            day: date!(1970 - 01 - 01),
            at: Time::MIDNIGHT,
            happened_at: datetime!(1970-01-01 0:00),
            reminder: None,
        }]
    );
}
