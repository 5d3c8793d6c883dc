//! Core domain types and logic.

pub mod analysis;
pub mod broker;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod hypothesis;
pub mod ledger;
pub mod order;
pub mod position;
pub mod risk;
pub mod suggestions;
pub mod sync;
pub mod trade;
