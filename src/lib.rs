pub mod analyzer;
pub mod compress;
pub mod config;
pub mod error;
pub mod extract;
pub mod intake;
pub mod media;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod routes;
pub mod uploader;
