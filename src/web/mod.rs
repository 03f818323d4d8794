//! HTTP status and control API for the roaster.
//! This file declares the other files in this directory as sub-modules.

pub mod api;
pub mod models;

pub use api::create_router;
