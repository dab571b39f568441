//! `shepherd-core`: shared primitives for the tenant-isolation boundary.
//!
//! This crate contains **pure** building blocks (no IO, no framework types).

pub mod error;
pub mod id;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{ChurchId, HouseholdId, MemberId, UserId};
pub use tenant::TenantScoped;
