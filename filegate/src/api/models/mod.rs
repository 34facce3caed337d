//! Response bodies returned by the API handlers.

pub mod files;
pub mod health;
