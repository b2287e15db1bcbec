//! Core types for Tanglechat

pub mod address;
pub mod contact;

pub use address::{Address, ADDRESS_LENGTH, TRYTE_ALPHABET};
pub use contact::{Contact, ContactState, ContactTransition};
