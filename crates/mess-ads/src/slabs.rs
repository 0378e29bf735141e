//! Credit Slab Resolver
//!
//! Tiered pricing: each slab maps a subscriber-count range to a per-user
//! credit cost. Resolution walks the active slab set on every call; there is
//! no caching layer in front of it.

use mess_common::{SlabId, ValidationError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// A tiered pricing rule: subscriber-count range -> per-user credit cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSlab {
    /// Slab id
    pub id: SlabId,
    /// Lower bound of the covered subscriber count (inclusive)
    pub min_users: u64,
    /// Upper bound of the covered subscriber count (inclusive)
    pub max_users: u64,
    /// Credits charged per targeted user
    pub credits_per_user: u64,
    /// Inactive slabs are skipped during resolution
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last admin edit
    pub updated_at: DateTime<Utc>,
}

impl CreditSlab {
    /// Whether this slab covers the given subscriber count
    pub fn covers(&self, user_count: u64) -> bool {
        self.min_users <= user_count && user_count <= self.max_users
    }
}

/// Slab resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlabError {
    /// No active slab covers the given subscriber count
    #[error("no active credit slab covers {user_count} users")]
    NoApplicableSlab {
        /// The uncovered subscriber count
        user_count: u64,
    },
    /// Slab id unknown
    #[error("credit slab not found")]
    NotFound,
    /// Field-level constraint violation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Admin-managed slab table with first-match resolution
pub struct SlabManager {
    slabs: Arc<RwLock<HashMap<SlabId, CreditSlab>>>,
}

impl SlabManager {
    pub fn new() -> Self {
        Self {
            slabs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn validate(min_users: u64, max_users: u64, credits_per_user: u64) -> Result<(), SlabError> {
        if max_users < min_users {
            return Err(ValidationError::new("max_users", "must be >= min_users").into());
        }
        if credits_per_user == 0 {
            return Err(ValidationError::new("credits_per_user", "must be >= 1").into());
        }
        Ok(())
    }

    /// Create a slab (admin operation)
    pub fn create(
        &self,
        min_users: u64,
        max_users: u64,
        credits_per_user: u64,
    ) -> Result<CreditSlab, SlabError> {
        Self::validate(min_users, max_users, credits_per_user)?;
        let now = Utc::now();
        let slab = CreditSlab {
            id: Uuid::new_v4(),
            min_users,
            max_users,
            credits_per_user,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.slabs.write().insert(slab.id, slab.clone());
        tracing::info!(slab_id = %slab.id, min_users, max_users, "credit slab created");
        Ok(slab)
    }

    /// Update a slab's range or cost (admin operation)
    pub fn update(
        &self,
        id: SlabId,
        min_users: u64,
        max_users: u64,
        credits_per_user: u64,
    ) -> Result<CreditSlab, SlabError> {
        Self::validate(min_users, max_users, credits_per_user)?;
        let mut slabs = self.slabs.write();
        let slab = slabs.get_mut(&id).ok_or(SlabError::NotFound)?;
        slab.min_users = min_users;
        slab.max_users = max_users;
        slab.credits_per_user = credits_per_user;
        slab.updated_at = Utc::now();
        Ok(slab.clone())
    }

    /// Deactivate a slab (admin operation)
    pub fn deactivate(&self, id: SlabId) -> Result<(), SlabError> {
        let mut slabs = self.slabs.write();
        let slab = slabs.get_mut(&id).ok_or(SlabError::NotFound)?;
        slab.is_active = false;
        slab.updated_at = Utc::now();
        Ok(())
    }

    /// Get slab by id
    pub fn get(&self, id: SlabId) -> Option<CreditSlab> {
        self.slabs.read().get(&id).cloned()
    }

    /// All slabs, ascending by `min_users`
    pub fn list(&self) -> Vec<CreditSlab> {
        let mut slabs: Vec<_> = self.slabs.read().values().cloned().collect();
        slabs.sort_by_key(|s| s.min_users);
        slabs
    }

    /// Find the active slab covering `user_count`.
    ///
    /// Overlapping ranges are not validated; when several slabs cover the
    /// count, the one with the lowest `min_users` wins.
    pub fn resolve(&self, user_count: u64) -> Result<CreditSlab, SlabError> {
        let slabs = self.slabs.read();
        let mut matching: Vec<_> = slabs
            .values()
            .filter(|s| s.is_active && s.covers(user_count))
            .collect();
        matching.sort_by_key(|s| s.min_users);
        matching
            .first()
            .map(|s| (*s).clone())
            .ok_or(SlabError::NoApplicableSlab { user_count })
    }

    /// Credit cost for targeting `user_count` users under the current table
    pub fn calculate_credits(&self, user_count: u64) -> Result<u64, SlabError> {
        let slab = self.resolve(user_count)?;
        user_count
            .checked_mul(slab.credits_per_user)
            .ok_or_else(|| ValidationError::new("user_count", "credit cost overflows").into())
    }
}

impl Default for SlabManager {
    fn default() -> Self {
        Self::new()
    }
}
