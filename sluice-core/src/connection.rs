use crate::{
    ConnectOptions, Context, DbError, Driver, ErrorKind, Error, Record, Result, Session,
    Statement, charset_encoding, codes,
    queue::{Job, Lane},
    statement::Prepared,
    WorkerPool,
};
use encoding_rs::Encoding;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

pub const FOUND_ROWS_QUERY: &str = "SELECT FOUND_ROWS()";

/// The checked out session of a connection together with the state bound to it.
pub(crate) struct Live {
    pub(crate) session: Box<dyn Session>,
    /// Statements prepared on an older session cannot run on this one.
    pub(crate) generation: u64,
    pub(crate) encoding: &'static Encoding,
    found_rows: Option<Prepared>,
}

impl Live {
    /// Total number of rows matched by the last `SQL_CALC_FOUND_ROWS` query.
    pub(crate) fn found_rows(&mut self) -> Result<u64> {
        let Live {
            session,
            generation,
            encoding,
            found_rows,
        } = self;
        let statement = match found_rows {
            Some(statement) => statement,
            None => found_rows.insert(Prepared::new::<(), (u64,)>(
                session.as_mut(),
                *generation,
                *encoding,
                FOUND_ROWS_QUERY,
            )?),
        };
        let mut row = (0u64,);
        if statement.fetch_one(session.as_mut(), &(), &mut row)? {
            Ok(row.0)
        } else {
            Err(log_missing_count())
        }
    }
}

fn log_missing_count() -> Error {
    let error = Error::from(DbError::new(
        ErrorKind::StatementExecute,
        0,
        "The found rows query returned no row",
    ));
    log::error!("{:#}", error);
    error
}

struct ConnectionInner {
    pool: WorkerPool,
    lane: Arc<Lane>,
    driver: Mutex<Option<(Arc<dyn Driver>, ConnectOptions)>>,
    live: Mutex<Option<Live>>,
    generation: AtomicU64,
}

/// Handle to one database session and its invocation queue. Cheap to clone, the clones
/// share the session.
///
/// Synchronous calls run on the calling thread, queued invocations run on the worker
/// pool in enqueue order. Either way the session is checked out for the whole call, so
/// one session is never used by two threads at once.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// A connection without a session, see [`Connection::connect`].
    pub fn new(pool: &WorkerPool) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                pool: pool.clone(),
                lane: pool.lane(),
                driver: Mutex::new(None),
                live: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn open(
        driver: Arc<dyn Driver>,
        options: ConnectOptions,
        pool: &WorkerPool,
    ) -> Result<Self> {
        let connection = Self::new(pool);
        connection.connect(driver, options)?;
        Ok(connection)
    }

    /// Open a session, replacing the current one if any.
    pub fn connect(&self, driver: Arc<dyn Driver>, options: ConnectOptions) -> Result<()> {
        let context = || {
            format!(
                "While connecting to `{}://{}@{}`",
                driver.name(),
                options.user.as_deref().unwrap_or_default(),
                options
                    .socket
                    .as_deref()
                    .or(options.host.as_deref())
                    .unwrap_or("localhost")
            )
        };
        let Some(encoding) = charset_encoding(&options.charset) else {
            let error = Error::from(DbError::new(
                ErrorKind::Connection,
                codes::UNKNOWN_CHARSET,
                format!("Character set `{}` is not supported", options.charset),
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        };
        let session = match driver.connect(&options) {
            Ok(session) => session,
            Err(e) => {
                let error = Error::from(DbError::connection(e)).context(context());
                log::error!("{:#}", error);
                return Err(error);
            }
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.lock_live() = Some(Live {
            session,
            generation,
            encoding,
            found_rows: None,
        });
        log::debug!(
            "{}, session {} uses {}",
            context().trim_start_matches("While connecting to "),
            generation,
            encoding.name()
        );
        *self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((driver, options));
        Ok(())
    }

    /// Open a new session with the driver and options of the last successful connect.
    pub fn reconnect(&self) -> Result<()> {
        let Some((driver, options)) = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            let error = Error::from(DbError::new(
                ErrorKind::Connection,
                codes::SERVER_GONE,
                "The connection was never established",
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        self.connect(driver, options)
    }

    /// Drop the session, statements prepared on it stop working.
    pub fn close(&self) {
        if let Some(live) = self.lock_live().take() {
            log::debug!("Closing session {}", live.generation);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock_live().is_some()
    }

    /// Encoding text fields are transcoded to, `None` without a session.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.lock_live().as_ref().map(|v| v.encoding)
    }

    pub fn options(&self) -> Option<ConnectOptions> {
        self.inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, options)| options.clone())
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Invocations accepted and not started yet.
    pub fn pending(&self) -> usize {
        self.inner.lane.pending()
    }

    /// Prepare a statement on this connection.
    pub fn prepare<P: Record, R: Record>(&self, query: impl Into<String>) -> Result<Statement<P, R>> {
        Statement::new(self, query)
    }

    /// Rows matched by the last `SQL_CALC_FOUND_ROWS` query, regardless of its `LIMIT`.
    pub fn found_rows(&self) -> Result<u64> {
        self.with_live(|live| live.found_rows())
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, Option<Live>> {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Check out the session for the duration of `f`.
    pub(crate) fn with_live<T>(&self, f: impl FnOnce(&mut Live) -> Result<T>) -> Result<T> {
        let mut live = self.lock_live();
        let Some(live) = live.as_mut() else {
            let error = Error::from(DbError::new(
                ErrorKind::Connection,
                codes::SERVER_GONE,
                "The connection has no session",
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        f(live)
    }

    /// Release a server side statement if the session it was prepared on is still open.
    pub(crate) fn release(&self, statement: &Prepared) {
        if let Some(live) = self.lock_live().as_mut()
            && live.generation == statement.generation()
        {
            live.session.close(statement.id());
        }
    }

    pub(crate) fn enqueue(&self, job: Job) -> Result<()> {
        self.inner
            .pool
            .enqueue(&self.inner.lane, job)
            .context("While queuing an invocation")
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending())
            .field("pool", &self.inner.pool)
            .finish()
    }
}
