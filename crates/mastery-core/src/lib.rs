//! mastery-core: Progression engine, mastery ledger, and gradebook.
//!
//! This crate defines the data model, the evaluator and ledger traits, and
//! the state machine that walks a student through a vocabulary unit until
//! every term is mastered.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod gradebook;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod sampling;
pub mod session;
pub mod traits;
