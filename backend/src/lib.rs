pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod house;
pub mod models;
pub mod moderation;
pub mod repo;
pub mod scheduler;
pub mod sender;
pub mod store;

pub use error::{Error, Result};
