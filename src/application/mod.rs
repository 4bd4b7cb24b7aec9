//! Application services layer.

pub mod error;
pub mod preload;
pub mod repos;
pub mod report;
pub mod settings;
