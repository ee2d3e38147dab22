use crate::{ConnectOptions, FieldMut, FieldRef, codes};
use std::fmt::{self, Display, Formatter};

/// Type tag of a bound buffer as understood by the binding protocol.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    #[default]
    Null,
    Tiny,
    Short,
    Long,
    LongLong,
    Float,
    Double,
    Date,
    Time,
    Datetime,
    String,
    Blob,
}

/// Temporal value as carried by the binding protocol, one number per component.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
    pub negative: bool,
}

/// Binding descriptor for one parameter or column. The array of these is laid out once
/// per statement, the slots below are rewritten on every execution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Binding {
    pub wire_type: WireType,
    pub unsigned: bool,
    /// Bytes the bound buffer can hold (variable length buffers only).
    pub capacity: usize,
    /// Actual length of the value, reported by the session for results.
    pub length: usize,
    pub is_null: bool,
    /// The session had more bytes than `capacity`.
    pub truncated: bool,
}

/// Where the session reads a parameter from.
#[derive(Debug)]
pub enum ParamBuffer<'a> {
    /// Nothing to send, the value is NULL.
    Empty,
    /// Direct binding: the record's own storage.
    Field(FieldRef<'a>),
    Bytes(&'a [u8]),
    Time(&'a WireTime),
}

/// Where the session writes a column to.
#[derive(Debug)]
pub enum ResultBuffer<'a> {
    Empty,
    /// Direct binding: the record's own storage.
    Field(FieldMut<'a>),
    /// Variable length payload, capacity is the current length of the vector.
    Bytes(&'a mut Vec<u8>),
    Time(&'a mut WireTime),
}

#[derive(Debug)]
pub struct ParamBind<'a> {
    pub binding: &'a Binding,
    pub buffer: ParamBuffer<'a>,
}

#[derive(Debug)]
pub struct ResultBind<'a> {
    pub binding: &'a mut Binding,
    pub buffer: ResultBuffer<'a>,
}

/// Outcome of fetching one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Row,
    /// A row was fetched but at least one column did not fit its buffer.
    Truncated,
    Done,
}

/// Server side handle of a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub u64);

/// What the session reports after preparing a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedInfo {
    pub id: StatementId,
    pub params: usize,
    pub columns: usize,
}

/// Code and message read from the session's error facility at the moment of failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    pub code: u32,
    pub message: String,
}

impl WireError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
    pub fn is_connection_lost(&self) -> bool {
        matches!(self.code, codes::SERVER_GONE | codes::SERVER_LOST)
    }
}

impl Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for WireError {}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// One live session with the database server. A session is used by one thread at a
/// time, the connection checks it out before every call.
pub trait Session: Send {
    /// Compile the query, placeholders are `?`.
    fn prepare(&mut self, query: &str) -> WireResult<PreparedInfo>;
    /// Send the parameters and execute, a previous result set is discarded.
    fn execute(&mut self, statement: StatementId, params: &[ParamBind<'_>]) -> WireResult<()>;
    /// Fetch the next row into the bound buffers, filling length and null slots.
    fn fetch(&mut self, statement: StatementId, row: &mut [ResultBind<'_>]) -> WireResult<Fetch>;
    /// Fetch one column of the current row again, starting at `offset` bytes.
    fn fetch_column(
        &mut self,
        statement: StatementId,
        column: usize,
        bind: &mut ResultBind<'_>,
        offset: usize,
    ) -> WireResult<()>;
    /// Discard the rows not fetched yet.
    fn free_result(&mut self, statement: StatementId) -> WireResult<()>;
    fn close(&mut self, statement: StatementId);
    /// Value generated for an auto increment column by the last execution.
    fn insert_id(&self, statement: StatementId) -> u64;
    fn affected_rows(&self, statement: StatementId) -> u64;
}

/// Opens sessions, this is the transport and authentication handshake.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;
    fn connect(&self, options: &ConnectOptions) -> WireResult<Box<dyn Session>>;
}
