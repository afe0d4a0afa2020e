//! Testing utilities and mock implementations
//!
//! Lets the relay be exercised without reachable destinations, a mail
//! relay or a persistent store.

pub mod mocks;

pub use mocks::*;
