//! ConsentGate - consent-gated candidate data access
//!
//! This library provides the core functionality for the ConsentGate service.
//! It exposes all modules for testing purposes.

pub mod entities;
pub mod errors;
pub mod fields;
pub mod gate;
pub mod issuer;
pub mod notify;
pub mod profiles;
pub mod projector;
pub mod settings;
pub mod state;
pub mod store;
pub mod web;
