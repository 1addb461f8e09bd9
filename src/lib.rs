pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod models;
pub mod notify;
pub mod passcode;
pub mod services;
pub mod state;
