use sluice::{WireError, WireResult, WireTime, WireType};
use sluice_memory::{MemoryServer, Outcome, Tables, WireValue};
use sluice_tests::*;

pub const INSERT_NOTE: &str = "INSERT INTO notes (body) VALUES (?)";
pub const SELECT_NOTE: &str = "SELECT body FROM notes WHERE id = ?";
pub const SELECT_LEVEL: &str = "SELECT level FROM gauges";

fn param(params: &[WireValue], index: usize) -> WireResult<&WireValue> {
    params
        .get(index)
        .ok_or_else(|| WireError::new(2031, format!("Missing parameter {}", index)))
}

fn by_id(tables: &mut Tables, table: &str, id: &WireValue) -> Vec<Vec<WireValue>> {
    let id = WireValue::UInt(id.as_u64().unwrap_or_default());
    tables
        .table(table)
        .find(0, &id)
        .map(|row| row[1..].to_vec())
        .collect()
}

fn delete(server: &MemoryServer, query: &str, table: &'static str) {
    server.route(query, &[], move |_, tables| {
        Ok(Outcome::affected(tables.table(table).clear()))
    });
}

fn insert(server: &MemoryServer, query: &str, table: &'static str) {
    server.route(query, &[], move |params, tables| {
        Ok(Outcome::inserted(
            tables.table(table).insert(params.iter().cloned()),
        ))
    });
}

fn date_part(value: &WireValue) -> WireValue {
    match value {
        WireValue::Time(v) => WireValue::Time(WireTime {
            year: v.year,
            month: v.month,
            day: v.day,
            ..Default::default()
        }),
        other => other.clone(),
    }
}

fn time_part(value: &WireValue) -> WireValue {
    match value {
        WireValue::Time(v) => WireValue::Time(WireTime {
            hour: v.hour,
            minute: v.minute,
            second: v.second,
            microsecond: v.microsecond,
            ..Default::default()
        }),
        other => other.clone(),
    }
}

fn numbers(tables: &mut Tables, min: &WireValue) -> Vec<Vec<WireValue>> {
    let min = min.as_i64().unwrap_or_default();
    let mut rows: Vec<_> = tables
        .table("numbers")
        .rows
        .iter()
        .filter(|r| r[1].as_i64().is_some_and(|v| v >= min))
        .map(|r| vec![r[1].clone()])
        .collect();
    rows.sort_by_key(|r| r[0].as_i64());
    rows
}

/// Server understanding every query of the shared test suite.
pub fn server() -> MemoryServer {
    let server = MemoryServer::new();

    delete(&server, DELETE_USERS, "users");
    insert(&server, INSERT_USER, "users");
    server.route(SELECT_USER_ID, &[WireType::LongLong], |params, tables| {
        let name = param(params, 0)?;
        Ok(Outcome::rows(
            tables
                .table("users")
                .find(1, name)
                .map(|row| vec![row[0].clone()])
                .collect(),
        ))
    });
    server.route(
        SELECT_USERS,
        &[
            WireType::LongLong,
            WireType::String,
            WireType::String,
            WireType::Date,
        ],
        |_, tables| Ok(Outcome::rows(tables.table("users").rows.clone())),
    );

    delete(&server, DELETE_BLOBS, "blobs");
    insert(&server, INSERT_BLOB, "blobs");
    server.route(
        SELECT_BLOB,
        &[WireType::Blob, WireType::String],
        |params, tables| Ok(Outcome::rows(by_id(tables, "blobs", param(params, 0)?))),
    );

    delete(&server, DELETE_EVENTS, "events");
    insert(&server, INSERT_EVENT, "events");
    server.route(
        SELECT_EVENT,
        &[
            WireType::String,
            WireType::Date,
            WireType::Time,
            WireType::Datetime,
            WireType::Time,
        ],
        |params, tables| {
            let rows = by_id(tables, "events", param(params, 0)?)
                .into_iter()
                .map(|row| {
                    vec![
                        row[0].clone(),
                        date_part(&row[1]),
                        time_part(&row[1]),
                        row[1].clone(),
                        row[2].clone(),
                    ]
                })
                .collect();
            Ok(Outcome::rows(rows))
        },
    );

    delete(&server, DELETE_NUMBERS, "numbers");
    insert(&server, INSERT_NUMBER, "numbers");
    server.route(SELECT_PAGE, &[WireType::Long], |params, tables| {
        let rows = numbers(tables, param(params, 0)?);
        let found = rows.len() as u64;
        let limit = param(params, 1)?.as_u64().unwrap_or_default() as usize;
        Ok(Outcome::rows(rows.into_iter().take(limit).collect()).found_rows(found))
    });
    server.route(SELECT_NUMBERS, &[WireType::Long], |params, tables| {
        Ok(Outcome::rows(numbers(tables, param(params, 0)?)))
    });

    delete(&server, DELETE_JOURNAL, "journal");
    insert(&server, INSERT_ENTRY, "journal");
    server.route(
        SELECT_ENTRIES,
        &[WireType::LongLong, WireType::LongLong],
        |_, tables| Ok(Outcome::rows(tables.table("journal").rows.clone())),
    );

    server.route(ECHO, &[WireType::LongLong], |params, _| {
        Ok(Outcome::rows(vec![vec![param(params, 0)?.clone()]]))
    });

    insert(&server, INSERT_NOTE, "notes");
    server.route(SELECT_NOTE, &[WireType::String], |params, tables| {
        Ok(Outcome::rows(by_id(tables, "notes", param(params, 0)?)))
    });
    server.route(SELECT_LEVEL, &[WireType::Tiny], |_, tables| {
        Ok(Outcome::rows(tables.table("gauges").rows.clone()))
    });

    server
}
