//! Collaborators living outside the session core: questions, durable results and the ledger.

/// Client for the external score settlement service.
pub mod ledger;
/// Persistence model definitions.
pub mod models;
/// Question sets per category.
pub mod question_bank;
/// Durable archive of results and pending settlements.
pub mod result_store;
/// Storage abstraction layer errors.
pub mod storage;
