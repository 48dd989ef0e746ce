pub mod agent;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod models;
pub mod providers;
pub mod registry;
