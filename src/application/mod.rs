//! Application layer orchestrating the card-present flow.
//!
//! `onboarding` decides whether a site may use a card reader, `sync` keeps the
//! cached records it reads up to date, and `coordinator` drives the reader
//! itself with single-flight discovery and capture.

pub mod coordinator;
pub mod onboarding;
pub mod sync;
pub mod token_provider;
