// Library for tests to access modules

pub mod config;
pub mod error;
pub mod history_store;
pub mod intake;
pub mod models;
pub mod retention_worker;
