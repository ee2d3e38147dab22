use crate::silent_logs;
use sluice::{Connection, DbError, ErrorKind, Record, Statement, codes};
use std::sync::LazyLock;
use time::{Date, macros::date};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const DELETE_USERS: &str = "DELETE FROM users";
pub const INSERT_USER: &str = "INSERT INTO users (name, email, born) VALUES (?, ?, ?)";
pub const SELECT_USER_ID: &str = "SELECT id FROM users WHERE name = ?";
pub const SELECT_USERS: &str = "SELECT id, name, email, born FROM users ORDER BY id";

#[derive(Record, Debug, Clone, PartialEq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: Option<String>,
    pub born: Option<Date>,
    #[record(skip)]
    pub visits: u32,
}

#[derive(Record, Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    pub born: Option<Date>,
}

pub async fn users(connection: &Connection) {
    let _lock = MUTEX.lock().await;

    // Cleanup
    let delete = connection
        .prepare::<(), ()>(DELETE_USERS)
        .expect("Could not prepare the delete");
    delete
        .execute(&(), None, None, None)
        .expect("Could not delete the users");

    // Nobody yet
    let find = Statement::<(String,), (u64,)>::new(connection, SELECT_USER_ID)
        .expect("Could not prepare the lookup");
    let mut ids = Vec::new();
    let mut rows = u64::MAX;
    find.execute(&("alice".into(),), Some(&mut ids), None, Some(&mut rows))
        .expect("Lookup on an empty table must succeed");
    assert!(ids.is_empty());
    assert_eq!(rows, 0);
    let mut id = (0,);
    assert!(
        !find
            .execute_one(&("alice".into(),), &mut id)
            .expect("Single row lookup must succeed")
    );

    // Insert
    let insert = connection
        .prepare::<NewUser, ()>(INSERT_USER)
        .expect("Could not prepare the insert");
    let mut alice_id = 0;
    let mut affected = 0;
    insert
        .execute(
            &NewUser {
                name: "alice".into(),
                email: Some("alice@example.com".into()),
                born: Some(date!(1990 - 04 - 12)),
            },
            None,
            Some(&mut alice_id),
            Some(&mut affected),
        )
        .expect("Could not insert alice");
    assert!(alice_id > 0);
    assert_eq!(affected, 1);
    let mut bob_id = 0;
    insert
        .execute(
            &NewUser {
                name: "bob".into(),
                email: None,
                born: None,
            },
            None,
            Some(&mut bob_id),
            None,
        )
        .expect("Could not insert bob");
    assert!(bob_id > alice_id);

    // Lookup
    let ids = find
        .fetch_all(&("alice".into(),))
        .expect("Could not look up alice");
    assert_eq!(ids, [(alice_id,)]);
    assert!(
        find.execute_one(&("bob".into(),), &mut id)
            .expect("Single row lookup must succeed")
    );
    assert_eq!(id, (bob_id,));

    // Everyone
    let select = connection
        .prepare::<(), User>(SELECT_USERS)
        .expect("Could not prepare the select");
    let mut users = vec![User {
        id: 0,
        name: "placeholder".into(),
        email: None,
        born: None,
        visits: 1,
    }];
    let mut rows = 0;
    select
        .execute(&(), Some(&mut users), None, Some(&mut rows))
        .expect("Could not select the users");
    assert_eq!(rows, 2);
    assert_eq!(
        users[1..],
        [
            User {
                id: alice_id,
                name: "alice".into(),
                email: Some("alice@example.com".into()),
                born: Some(date!(1990 - 04 - 12)),
                visits: 0,
            },
            User {
                id: bob_id,
                name: "bob".into(),
                email: None,
                born: None,
                visits: 0,
            },
        ]
    );

    // Records must match the query
    let result;
    silent_logs! {
        result = connection.prepare::<(), (u64,)>(SELECT_USER_ID);
    }
    let error = result.expect_err("The lookup has one placeholder");
    let error = error
        .downcast_ref::<DbError>()
        .expect("Count mismatch is a database error");
    assert_eq!(error.kind(), ErrorKind::StatementPrepare);
    assert_eq!(error.code(), codes::COUNT_MISMATCH);

    // Required field receiving NULL
    let strict = connection
        .prepare::<(), (u64, String, String, Option<Date>)>(SELECT_USERS)
        .expect("Could not prepare the strict select");
    let mut rows = vec![(0, String::new(), String::new(), None)];
    let result;
    silent_logs! {
        result = strict.execute(&(), Some(&mut rows), None, None);
    }
    let error = result.expect_err("Bob has no email");
    assert_eq!(rows.len(), 1, "Failed execution leaves the results as they were");
    let error = DbError::from_error(&error);
    assert_eq!(error.kind(), ErrorKind::Conversion);
    assert_eq!(error.code(), codes::UNEXPECTED_NULL);
}
