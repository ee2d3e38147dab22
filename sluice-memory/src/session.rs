use crate::{
    MemoryServer, Outcome, WireValue, codes,
    server::{Route, ServerState},
};
use sluice_core::{
    FOUND_ROWS_QUERY, Fetch, ParamBind, PreparedInfo, ResultBind, Session, StatementId,
    WireError, WireResult, codes as client, count_placeholders, truncate_long,
};
use std::{
    collections::{HashMap, VecDeque},
    thread,
};

enum Source {
    Route(Route),
    FoundRows,
}

struct MemoryStatement {
    params: usize,
    columns: usize,
    source: Source,
    pending: VecDeque<Vec<WireValue>>,
    current: Option<Vec<WireValue>>,
    affected: u64,
    insert_id: u64,
}

/// One session with a [`MemoryServer`].
pub struct MemorySession {
    server: MemoryServer,
    epoch: u64,
    number: u64,
    statements: HashMap<u64, MemoryStatement>,
    next_statement: u64,
    found_rows: u64,
}

impl MemorySession {
    pub(crate) fn new(server: MemoryServer, epoch: u64, number: u64) -> Self {
        Self {
            server,
            epoch,
            number,
            statements: Default::default(),
            next_statement: 0,
            found_rows: 0,
        }
    }

    fn check(epoch: u64, state: &mut ServerState, lost: u32) -> WireResult<()> {
        if state.epoch != epoch {
            return Err(WireError::new(
                lost,
                match lost {
                    client::SERVER_GONE => "Server has gone away",
                    _ => "Lost connection to server during query",
                },
            ));
        }
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        Ok(())
    }

    fn statement(
        statements: &mut HashMap<u64, MemoryStatement>,
        id: StatementId,
    ) -> WireResult<&mut MemoryStatement> {
        statements.get_mut(&id.0).ok_or_else(|| {
            WireError::new(
                codes::UNKNOWN_STATEMENT,
                format!("Unknown prepared statement handler ({})", id.0),
            )
        })
    }
}

impl Session for MemorySession {
    fn prepare(&mut self, query: &str) -> WireResult<PreparedInfo> {
        let source = {
            let mut state = self.server.lock();
            Self::check(self.epoch, &mut state, client::SERVER_GONE)?;
            let source = if query == FOUND_ROWS_QUERY {
                Source::FoundRows
            } else {
                match state.routes.get(query) {
                    Some(route) => Source::Route(route.clone()),
                    None => {
                        return Err(WireError::new(
                            codes::PARSE_ERROR,
                            format!(
                                "You have an error in your SQL syntax near '{}'",
                                truncate_long!(query)
                            ),
                        ));
                    }
                }
            };
            state.open_statements += 1;
            source
        };
        let columns = match &source {
            Source::Route(route) => route.columns.len(),
            Source::FoundRows => 1,
        };
        self.next_statement += 1;
        let info = PreparedInfo {
            id: StatementId(self.next_statement),
            params: count_placeholders(query),
            columns,
        };
        self.statements.insert(
            self.next_statement,
            MemoryStatement {
                params: info.params,
                columns,
                source,
                pending: Default::default(),
                current: None,
                affected: 0,
                insert_id: 0,
            },
        );
        Ok(info)
    }

    fn execute(&mut self, statement: StatementId, params: &[ParamBind<'_>]) -> WireResult<()> {
        let latency = {
            let mut state = self.server.lock();
            Self::check(self.epoch, &mut state, client::SERVER_LOST)?;
            state.executions += 1;
            state.latency
        };
        let found_rows = self.found_rows;
        let prepared = Self::statement(&mut self.statements, statement)?;
        prepared.pending.clear();
        prepared.current = None;
        if params.len() != prepared.params {
            return Err(WireError::new(
                codes::MISSING_PARAMETERS,
                format!(
                    "No data supplied for parameters in prepared statement, {} bound out of {}",
                    params.len(),
                    prepared.params
                ),
            ));
        }
        let values = params
            .iter()
            .map(WireValue::from_param)
            .collect::<WireResult<Vec<_>>>()?;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let outcome = match &prepared.source {
            Source::FoundRows => Outcome::rows(vec![vec![WireValue::UInt(found_rows)]]),
            Source::Route(route) => {
                let mut state = self.server.lock();
                Self::check(self.epoch, &mut state, client::SERVER_LOST)?;
                (route.handler)(&values, &mut state.tables)?
            }
        };
        if let Some(row) = outcome.rows.iter().find(|r| r.len() != prepared.columns) {
            return Err(WireError::new(
                codes::MALFORMED_PACKET,
                format!(
                    "Row with {} values for a result of {} columns",
                    row.len(),
                    prepared.columns
                ),
            ));
        }
        if let Source::Route(..) = prepared.source {
            self.found_rows = outcome.found_rows.unwrap_or(outcome.rows.len() as u64);
        }
        prepared.affected = outcome.affected;
        prepared.insert_id = outcome.insert_id;
        prepared.pending = outcome.rows.into();
        Ok(())
    }

    fn fetch(&mut self, statement: StatementId, row: &mut [ResultBind<'_>]) -> WireResult<Fetch> {
        Self::check(self.epoch, &mut self.server.lock(), client::SERVER_LOST)?;
        let prepared = Self::statement(&mut self.statements, statement)?;
        if row.len() != prepared.columns {
            return Err(WireError::new(
                codes::UNSUPPORTED_BUFFER,
                format!(
                    "{} buffers bound for a result of {} columns",
                    row.len(),
                    prepared.columns
                ),
            ));
        }
        let Some(values) = prepared.pending.pop_front() else {
            prepared.current = None;
            return Ok(Fetch::Done);
        };
        let mut truncated = false;
        for (value, bind) in values.iter().zip(row.iter_mut()) {
            truncated |= value.write(bind)?;
        }
        prepared.current = Some(values);
        Ok(if truncated {
            Fetch::Truncated
        } else {
            Fetch::Row
        })
    }

    fn fetch_column(
        &mut self,
        statement: StatementId,
        column: usize,
        bind: &mut ResultBind<'_>,
        offset: usize,
    ) -> WireResult<()> {
        Self::check(self.epoch, &mut self.server.lock(), client::SERVER_LOST)?;
        let prepared = Self::statement(&mut self.statements, statement)?;
        let Some(value) = prepared.current.as_ref().and_then(|v| v.get(column)) else {
            return Err(WireError::new(
                codes::NO_ROW,
                "Attempt to read column without prior row fetch",
            ));
        };
        value.write_from(bind, offset)
    }

    fn free_result(&mut self, statement: StatementId) -> WireResult<()> {
        let prepared = Self::statement(&mut self.statements, statement)?;
        prepared.pending.clear();
        prepared.current = None;
        Ok(())
    }

    fn close(&mut self, statement: StatementId) {
        if self.statements.remove(&statement.0).is_some() {
            let mut state = self.server.lock();
            state.open_statements = state.open_statements.saturating_sub(1);
        }
    }

    fn insert_id(&self, statement: StatementId) -> u64 {
        self.statements.get(&statement.0).map_or(0, |v| v.insert_id)
    }

    fn affected_rows(&self, statement: StatementId) -> u64 {
        self.statements.get(&statement.0).map_or(0, |v| v.affected)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut state = self.server.lock();
        state.open_statements = state.open_statements.saturating_sub(self.statements.len());
        log::trace!("Memory session {} closed", self.number);
    }
}
