pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod services;
pub mod session;
pub mod settings;
pub mod store;
