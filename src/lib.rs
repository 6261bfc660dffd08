#![forbid(unsafe_code)]

//! Client library for a geofenced classroom attendance service.

pub mod api;
pub mod config;
pub mod desk;
pub mod editor;
pub mod errors;
pub mod feed;
pub mod gate;
pub mod geofence;
pub mod location;
pub mod models;
pub mod render;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
