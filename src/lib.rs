pub mod config;
pub mod db;
pub mod kafka;
pub mod models;
pub mod processor;
pub mod store;
