// Library exports for Poster
// This allows integration tests and external code to use Poster modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod media;
pub mod moderation;
pub mod profile;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;
