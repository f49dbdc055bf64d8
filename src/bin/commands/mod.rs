pub mod build;
pub mod cache;
pub mod config;
