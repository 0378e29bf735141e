//! SmartMess Common - shared types for the SmartMess platform
//!
//! Id aliases and the field-level validation error used across the
//! ad-credit crates.

#![warn(missing_docs)]

pub mod error;
pub mod ids;

pub use error::{ValidationError, ValidationResult};
pub use ids::{CampaignId, MessId, PlanId, SlabId, TransactionId, UserId};
