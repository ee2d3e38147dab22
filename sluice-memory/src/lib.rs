//! In process implementation of the session and driver traits, a scripted server
//! holding its tables in memory.
mod driver;
mod server;
mod session;
mod value;

pub use driver::*;
pub use server::*;
pub use session::*;
pub use value::*;
