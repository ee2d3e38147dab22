mod binder;
mod connection;
mod conversion;
mod error;
mod field;
mod options;
mod queue;
mod record;
mod statement;
mod util;
mod wire;

pub use ::anyhow::Context;
pub use binder::*;
pub use connection::*;
pub use conversion::*;
pub use error::*;
pub use field::*;
pub use options::*;
pub use queue::*;
pub use record::*;
pub use statement::*;
pub use util::*;
pub use wire::*;
pub use ::encoding_rs;
pub use ::time;
pub mod future {
    pub use ::futures::future::*;
}

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
