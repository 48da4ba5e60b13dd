pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod geo;
pub mod ingest;
pub mod matrix;
pub mod output;
pub mod store;
