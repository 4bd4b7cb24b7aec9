//! A key/value settings store kept coherent across a process-local memo tier, a shared
//! cache tier and a durable backing store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
