//! Domain model for card-present payments: cached site records, the onboarding
//! outcome, card readers, payment values and the ports the application layer
//! talks through.

pub mod account;
pub mod onboarding;
pub mod payment;
pub mod plugin;
pub mod ports;
pub mod reader;
pub mod setting;

/// Remote identifier of a store.
pub type SiteId = i64;

/// Remote identifier of an order within a store.
pub type OrderId = i64;
