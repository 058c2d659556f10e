pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod comments;
pub mod config;
pub mod database;
pub mod error;
pub mod invalidation;
pub mod node;
pub mod telemetry;
pub mod threading;
pub mod user_index;
pub mod users;
pub mod utils;
