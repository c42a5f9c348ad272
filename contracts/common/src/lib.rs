//! Everbond Common Library
//!
//! Shared types, constants, and utilities for the Everbond protocol: a
//! perpetual claim token backed by a rotating basket of fixed-maturity,
//! seniority-tranched bonds, plus a companion rollover vault.
//!
//! This crate holds the leaf components both engines build on:
//!
//! - **Conversion Engine**: pure fixed-point tranche <-> claim math
//! - **Bond Queue**: maturity-ordered FIFO with a rolling admission window
//! - **Reserve Ledger**: insertion-ordered asset balances with dust suppression
//! - **Yield Table**: per-class seniority yield factors, frozen on first use
//! - **Collaborator traits**: issuer, fee policy, pricing, asset transfer
//! - **Events**: structured log of every state mutation
//!
//! Engines own their state structs and borrow them explicitly; there is no
//! ambient global storage, so a host wrapping each operation in a
//! single-writer critical section gets atomicity structurally.
//!
//! This crate is `no_std` compatible for embedded or proving environments
//! when built without the default `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export Vec for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod collaborators;
pub mod constants;
pub mod conversion;
pub mod errors;
pub mod events;
pub mod math;
pub mod queue;
pub mod reserve;
#[cfg(feature = "std")]
pub mod testing;
pub mod types;
pub mod yields;

// Re-exports for convenience
pub use collaborators::*;
pub use constants::*;
pub use conversion::*;
pub use errors::*;
pub use events::*;
pub use math::*;
pub use queue::*;
pub use reserve::*;
pub use types::*;
pub use yields::*;
