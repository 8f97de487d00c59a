pub mod aggregate;
pub mod app;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod labels;
pub mod output;
pub mod series;
pub mod session;
pub mod table;
pub mod throttle;
