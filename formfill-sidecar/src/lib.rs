pub mod analyzer;
pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod extensions;
pub mod models;
pub mod recording;
pub mod replay;
pub mod store;
