//! Shared primitives: the PCE client, the inventory, the reconciliation
//! policy, and the apply pipeline every command builds on.

pub mod api;
pub mod apply;
pub mod config;
pub mod csvio;
pub mod diff;
pub mod error;
pub mod headers;
pub mod inventory;
pub mod logging;
pub mod model;
pub mod output;
pub mod reconcile;
