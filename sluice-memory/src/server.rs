use crate::WireValue;
use sluice_core::{WireError, WireResult, WireType};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Result of running a scripted query.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outcome {
    pub rows: Vec<Vec<WireValue>>,
    pub affected: u64,
    pub insert_id: u64,
    /// Rows matched ignoring `LIMIT`, defaults to the number of rows returned.
    pub found_rows: Option<u64>,
}

impl Outcome {
    pub fn rows(rows: Vec<Vec<WireValue>>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            ..Default::default()
        }
    }

    pub fn inserted(insert_id: u64) -> Self {
        Self {
            affected: 1,
            insert_id,
            ..Default::default()
        }
    }

    pub fn found_rows(mut self, found_rows: u64) -> Self {
        self.found_rows = Some(found_rows);
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct Table {
    pub rows: Vec<Vec<WireValue>>,
    auto_increment: u64,
}

impl Table {
    /// Append a row whose first column is the generated identifier.
    pub fn insert(&mut self, values: impl IntoIterator<Item = WireValue>) -> u64 {
        self.auto_increment += 1;
        let mut row = vec![WireValue::UInt(self.auto_increment)];
        row.extend(values);
        self.rows.push(row);
        self.auto_increment
    }

    /// Remove every row, the identifiers keep increasing.
    pub fn clear(&mut self) -> u64 {
        let removed = self.rows.len() as u64;
        self.rows.clear();
        removed
    }

    pub fn find<'a>(
        &'a self,
        column: usize,
        value: &'a WireValue,
    ) -> impl Iterator<Item = &'a Vec<WireValue>> + 'a {
        self.rows.iter().filter(move |r| r.get(column) == Some(value))
    }
}

#[derive(Debug, Default)]
pub struct Tables {
    tables: BTreeMap<String, Table>,
}

impl Tables {
    /// The table named `name`, created empty if missing.
    pub fn table(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.into()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

pub type Handler = dyn Fn(&[WireValue], &mut Tables) -> WireResult<Outcome> + Send + Sync;

#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) columns: Vec<WireType>,
    pub(crate) handler: Arc<Handler>,
}

#[derive(Default)]
pub(crate) struct ServerState {
    pub(crate) tables: Tables,
    pub(crate) routes: HashMap<String, Route>,
    pub(crate) credentials: Option<(String, String)>,
    pub(crate) fail_next: Option<WireError>,
    pub(crate) down: bool,
    /// Bumped on every disconnect, sessions opened before it are lost.
    pub(crate) epoch: u64,
    pub(crate) latency: Duration,
    pub(crate) sessions: u64,
    pub(crate) open_statements: usize,
    pub(crate) executions: u64,
}

/// Scripted database server living in the test process.
///
/// Every query the server understands is registered with [`MemoryServer::route`]: the
/// exact query text, the wire types of its columns and a handler running it against the
/// tables. `SELECT FOUND_ROWS()` is built in.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Only accept sessions authenticating as `user` with `password`.
    pub fn with_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.lock().credentials = Some((user.into(), password.into()));
        self
    }

    pub fn route(
        &self,
        query: impl Into<String>,
        columns: &[WireType],
        handler: impl Fn(&[WireValue], &mut Tables) -> WireResult<Outcome> + Send + Sync + 'static,
    ) -> &Self {
        self.lock().routes.insert(
            query.into(),
            Route {
                columns: columns.to_vec(),
                handler: Arc::new(handler),
            },
        );
        self
    }

    pub fn tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        f(&mut self.lock().tables)
    }

    /// The next prepare, execute or fetch fails with this error.
    pub fn fail_next(&self, code: u32, message: impl Into<String>) {
        self.lock().fail_next = Some(WireError::new(code, message));
    }

    /// Drop every session: their calls fail as a lost connection from now on, new
    /// sessions are refused until [`MemoryServer::restore`].
    pub fn disconnect(&self) {
        log::debug!("Memory server goes down");
        let mut state = self.lock();
        state.down = true;
        state.epoch += 1;
    }

    pub fn restore(&self) {
        self.lock().down = false;
    }

    /// Delay applied to every execution, outside of the server lock.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn sessions(&self) -> u64 {
        self.lock().sessions
    }

    pub fn open_statements(&self) -> usize {
        self.lock().open_statements
    }

    pub fn executions(&self) -> u64 {
        self.lock().executions
    }
}

impl Debug for MemoryServer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryServer")
            .field("tables", &state.tables)
            .field("routes", &state.routes.keys().collect::<Vec<_>>())
            .field("down", &state.down)
            .finish()
    }
}
