mod blobs;
mod concurrent;
mod errors;
mod found_rows;
mod queued;
mod temporal;
mod users;

pub use crate::{
    blobs::*, concurrent::*, errors::*, found_rows::*, queued::*, temporal::*, users::*,
};
use log::LevelFilter;
use sluice::Connection;
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run every scenario against a connected connection. The driver must understand the
/// queries exported by this crate.
pub async fn execute_tests(connection: &Connection) {
    users(connection).await;
    blobs(connection).await;
    temporal(connection).await;
    found_rows(connection).await;
    queued(connection).await;
    concurrent(connection).await;
    errors(connection).await;
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
