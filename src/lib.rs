pub mod booking;
pub mod cascade;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod interval;
pub mod matching;
pub mod models;
pub mod notify;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
