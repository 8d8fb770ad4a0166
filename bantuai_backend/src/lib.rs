pub mod auth;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod format;
pub mod http_client;
pub mod proxy;
pub mod runtime;
pub mod server;
pub mod store;
pub mod webhook;
