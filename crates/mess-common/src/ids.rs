//! Entity Id Aliases

use uuid::Uuid;

/// Mess (tenant) id
pub type MessId = Uuid;

/// End-user id
pub type UserId = Uuid;

/// Ad campaign id
pub type CampaignId = Uuid;

/// Credit slab id
pub type SlabId = Uuid;

/// Credit purchase plan id
pub type PlanId = Uuid;

/// Credit transaction id
pub type TransactionId = Uuid;
