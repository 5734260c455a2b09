pub mod api;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod models;
pub mod providers;
pub mod utils;
pub mod workers;
