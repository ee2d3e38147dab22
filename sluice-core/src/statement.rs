use crate::{
    BindingTable, Completion, Connection, DbError, Error, ErrorKind, Fetch, InvocationState,
    Record, Result, Session, StatementId, Ticket, calculates_found_rows, codes,
    connection::Live, queue::panic_message, truncate_long,
};
use encoding_rs::Encoding;
use futures::{FutureExt, channel::oneshot, future::BoxFuture};
use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

#[derive(Debug)]
pub(crate) struct Bindings {
    params: BindingTable,
    results: BindingTable,
}

/// Untyped core of a prepared statement: server handle plus the binding tables of both
/// sides. The mutex around the tables serializes executions of the same statement.
#[derive(Debug)]
pub(crate) struct Prepared {
    id: StatementId,
    generation: u64,
    query: String,
    found_rows: bool,
    tables: Mutex<Bindings>,
}

impl Prepared {
    pub(crate) fn new<P: Record, R: Record>(
        session: &mut dyn Session,
        generation: u64,
        encoding: &'static Encoding,
        query: &str,
    ) -> Result<Self> {
        let context = || format!("While preparing the query:\n{}", truncate_long!(query));
        let info = match session.prepare(query) {
            Ok(info) => info,
            Err(e) => {
                let error = Error::from(DbError::prepare(e)).context(context());
                log::error!("{:#}", error);
                return Err(error);
            }
        };
        let mismatch = if info.params != P::sql_elements() {
            Some(format!(
                "The query has {} placeholders but the parameter record has {} fields",
                info.params,
                P::sql_elements()
            ))
        } else if info.columns != R::sql_elements() {
            Some(format!(
                "The query returns {} columns but the result record has {} fields",
                info.columns,
                R::sql_elements()
            ))
        } else {
            None
        };
        if let Some(message) = mismatch {
            session.close(info.id);
            let error = Error::from(DbError::count_mismatch(message)).context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        log::debug!(
            "Prepared statement {} ({} parameters, {} columns): {}",
            info.id.0,
            info.params,
            info.columns,
            truncate_long!(query)
        );
        Ok(Self {
            id: info.id,
            generation,
            query: query.into(),
            found_rows: calculates_found_rows(query),
            tables: Mutex::new(Bindings {
                params: BindingTable::of::<P>(encoding),
                results: BindingTable::of::<R>(encoding),
            }),
        })
    }

    pub(crate) fn id(&self) -> StatementId {
        self.id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, live: &Live) -> Result<()> {
        if live.generation != self.generation {
            return Err(DbError::new(
                ErrorKind::Connection,
                codes::SERVER_GONE,
                "The statement was prepared on a session that is closed",
            )
            .into());
        }
        Ok(())
    }

    fn send<P: Record>(
        &self,
        tables: &mut Bindings,
        session: &mut dyn Session,
        params: &P,
    ) -> Result<()> {
        let binds = tables.params.bind_parameters(params.fields())?;
        session.execute(self.id, &binds).map_err(DbError::execute)?;
        Ok(())
    }

    /// Fetch the next row into `row`, false when the result set is exhausted.
    fn fetch<R: Record>(
        &self,
        tables: &mut Bindings,
        session: &mut dyn Session,
        row: &mut R,
    ) -> Result<bool> {
        let fetch = {
            let mut binds = tables.results.bind_results(row);
            session.fetch(self.id, &mut binds).map_err(DbError::execute)?
        };
        if fetch == Fetch::Done {
            return Ok(false);
        }
        if fetch == Fetch::Truncated {
            for column in tables.results.truncated() {
                let mut bind = tables.results.rebind_column(column)?;
                session
                    .fetch_column(self.id, column, &mut bind, 0)
                    .map_err(DbError::execute)?;
            }
        }
        tables.results.decode_row(row)?;
        Ok(true)
    }

    fn drain<R: Record>(
        &self,
        tables: &mut Bindings,
        session: &mut dyn Session,
        mut sink: Option<&mut Vec<R>>,
    ) -> Result<u64> {
        let mut fetched = 0;
        loop {
            let mut row = R::empty();
            if !self.fetch(tables, session, &mut row)? {
                return Ok(fetched);
            }
            fetched += 1;
            if let Some(sink) = sink.as_deref_mut() {
                sink.push(row);
            }
        }
    }

    /// Execute and fetch every row, returns the number of rows fetched.
    fn run<P: Record, R: Record>(
        &self,
        session: &mut dyn Session,
        params: &P,
        sink: Option<&mut Vec<R>>,
        insert_id: Option<&mut u64>,
    ) -> Result<u64> {
        let mut tables = self.lock();
        self.send(&mut tables, session, params)?;
        let mut fetched = 0;
        if !tables.results.is_empty() {
            fetched = match self.drain(&mut tables, session, sink) {
                Ok(fetched) => fetched,
                Err(error) => {
                    let _ = session.free_result(self.id);
                    return Err(error);
                }
            };
        }
        if let Some(insert_id) = insert_id {
            *insert_id = session.insert_id(self.id);
        }
        Ok(fetched)
    }

    /// Execute and fetch at most one row, the rest of the result set is discarded.
    pub(crate) fn fetch_one<P: Record, R: Record>(
        &self,
        session: &mut dyn Session,
        params: &P,
        row: &mut R,
    ) -> Result<bool> {
        let mut tables = self.lock();
        self.send(&mut tables, session, params)?;
        let fetched = self.fetch(&mut tables, session, row);
        let freed = session.free_result(self.id).map_err(DbError::execute);
        let fetched = fetched?;
        freed?;
        Ok(fetched)
    }
}

/// A prepared statement with a parameter record `P` and a result record `R`, `()` when
/// the statement has no placeholders or returns no rows.
///
/// The statement can be executed any number of times, synchronously with
/// [`Statement::execute`] or on the worker pool with [`Statement::queue`]. Executions of
/// the same statement never overlap.
pub struct Statement<P: Record = (), R: Record = ()> {
    connection: Connection,
    prepared: Prepared,
    _records: PhantomData<fn(&P) -> R>,
}

impl<P: Record, R: Record> Statement<P, R> {
    /// Compile `query` on the connection's session. Fails when the server rejects it or
    /// when the placeholders and columns do not match the records.
    pub fn new(connection: &Connection, query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        let prepared = connection.with_live(|live| {
            Prepared::new::<P, R>(live.session.as_mut(), live.generation, live.encoding, &query)
        })?;
        Ok(Self {
            connection: connection.clone(),
            prepared,
            _records: PhantomData,
        })
    }

    pub fn query(&self) -> &str {
        &self.prepared.query
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn execute_live(
        &self,
        live: &mut Live,
        params: &P,
        sink: Option<&mut Vec<R>>,
        insert_id: Option<&mut u64>,
        rows: Option<&mut u64>,
    ) -> Result<()> {
        self.prepared.check(live)?;
        let fetched = self
            .prepared
            .run(live.session.as_mut(), params, sink, insert_id)?;
        if let Some(rows) = rows {
            *rows = if self.prepared.found_rows {
                live.found_rows()?
            } else if R::sql_elements() > 0 {
                fetched
            } else {
                live.session.affected_rows(self.prepared.id)
            };
        }
        Ok(())
    }

    fn context(&self, error: Error) -> Error {
        let error = error.context(format!(
            "While executing the query:\n{}",
            truncate_long!(self.prepared.query)
        ));
        log::error!("{:#}", error);
        error
    }

    /// Execute the statement and append every returned row to `results`.
    ///
    /// `insert_id` receives the value generated for an auto increment column, `rows` the
    /// number of rows: found rows for `SQL_CALC_FOUND_ROWS` queries, fetched rows for
    /// other queries returning rows, affected rows otherwise. On failure `results` is
    /// left as it was.
    pub fn execute(
        &self,
        params: &P,
        mut results: Option<&mut Vec<R>>,
        insert_id: Option<&mut u64>,
        rows: Option<&mut u64>,
    ) -> Result<()> {
        let len = results.as_ref().map(|v| v.len());
        let result = self.connection.with_live(|live| {
            self.execute_live(live, params, results.as_deref_mut(), insert_id, rows)
        });
        if let Err(error) = result {
            if let (Some(results), Some(len)) = (results, len) {
                results.truncate(len);
            }
            return Err(self.context(error));
        }
        Ok(())
    }

    /// Execute and collect the rows.
    pub fn fetch_all(&self, params: &P) -> Result<Vec<R>> {
        let mut results = Vec::new();
        self.execute(params, Some(&mut results), None, None)?;
        Ok(results)
    }

    /// Execute and fetch only the first row into `result`, for queries known to match at
    /// most one row. Returns whether a row was produced.
    pub fn execute_one(&self, params: &P, result: &mut R) -> Result<bool> {
        self.connection
            .with_live(|live| {
                self.prepared.check(live)?;
                self.prepared
                    .fetch_one(live.session.as_mut(), params, result)
            })
            .map_err(|e| self.context(e))
    }

    /// Queue the statement for execution on the worker pool and return immediately.
    ///
    /// The shared storage stays alive until `callback` fires. The callback is called
    /// exactly once, with the error if the invocation failed. When it fails `results` keeps
    /// the rows fetched before the failure. Invocations queued on the same connection run
    /// in the order they were queued.
    pub fn queue(
        self: &Arc<Self>,
        params: Arc<P>,
        results: Option<Arc<Mutex<Vec<R>>>>,
        insert_id: Option<Arc<AtomicU64>>,
        rows: Option<Arc<AtomicU64>>,
        callback: impl FnOnce(Completion) + Send + 'static,
    ) -> Result<Ticket> {
        let statement = self.clone();
        let ticket = Ticket::new();
        let state = ticket.clone();
        let job = Box::new(move || {
            state.set(InvocationState::Running);
            log::trace!(
                "Running queued invocation of statement {}",
                statement.prepared.id.0
            );
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                statement.run_queued(
                    &params,
                    results.as_deref(),
                    insert_id.as_deref(),
                    rows.as_deref(),
                )
            }));
            let completion = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(DbError::from_error(&error)),
                Err(panic) => {
                    let error = DbError::new(
                        ErrorKind::StatementExecute,
                        codes::WORKER_PANIC,
                        format!("The invocation panicked: {}", panic_message(&*panic)),
                    );
                    log::error!("{:#}", error);
                    Err(error)
                }
            };
            state.set(match completion {
                Ok(..) => InvocationState::Completed,
                Err(..) => InvocationState::Failed,
            });
            log::trace!(
                "Queued invocation of statement {} is {:?}",
                statement.prepared.id.0,
                state.state()
            );
            drop(params);
            drop(results);
            callback(completion);
        });
        self.connection.enqueue(job)?;
        Ok(ticket)
    }

    fn run_queued(
        &self,
        params: &P,
        results: Option<&Mutex<Vec<R>>>,
        insert_id: Option<&AtomicU64>,
        rows: Option<&AtomicU64>,
    ) -> Result<()> {
        let mut sink = results.map(|v| v.lock().unwrap_or_else(PoisonError::into_inner));
        let (mut id, mut count) = (0, 0);
        self.connection
            .with_live(|live| {
                self.execute_live(
                    live,
                    params,
                    sink.as_deref_mut(),
                    insert_id.is_some().then_some(&mut id),
                    rows.is_some().then_some(&mut count),
                )
            })
            .map_err(|e| self.context(e))?;
        if let Some(insert_id) = insert_id {
            insert_id.store(id, Ordering::Release);
        }
        if let Some(rows) = rows {
            rows.store(count, Ordering::Release);
        }
        Ok(())
    }

    /// [`Statement::queue`] for async callers: the future resolves when the invocation
    /// completes. Race it against a timer to bound the wait, the invocation itself keeps
    /// running.
    pub fn queue_future(
        self: &Arc<Self>,
        params: Arc<P>,
        results: Option<Arc<Mutex<Vec<R>>>>,
        insert_id: Option<Arc<AtomicU64>>,
        rows: Option<Arc<AtomicU64>>,
    ) -> Result<BoxFuture<'static, Completion>> {
        let (tx, rx) = oneshot::channel();
        self.queue(params, results, insert_id, rows, move |completion| {
            let _ = tx.send(completion);
        })?;
        Ok(rx
            .map(|v| {
                v.unwrap_or_else(|_| {
                    Err(DbError::new(
                        ErrorKind::StatementExecute,
                        codes::WORKER_PANIC,
                        "The invocation was dropped before completing",
                    ))
                })
            })
            .boxed())
    }
}

impl<P: Record, R: Record> Drop for Statement<P, R> {
    fn drop(&mut self) {
        self.connection.release(&self.prepared);
    }
}

impl<P: Record, R: Record> Debug for Statement<P, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.prepared.id)
            .field("query", &self.prepared.query)
            .field("params", &P::sql_elements())
            .field("results", &R::sql_elements())
            .finish()
    }
}
