//! Credit Purchase Plans
//!
//! Read-mostly catalog of credit packs. The grand total of a plan is derived
//! from its base and bonus credits at read time, never stored.

use mess_common::{PlanId, ValidationError};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Catalog entry for a purchasable credit pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPurchasePlan {
    /// Plan id
    pub id: PlanId,
    /// Display name
    pub name: String,
    /// Credits paid for
    pub base_credits: u64,
    /// Promotional extra credits
    pub bonus_credits: u64,
    /// Price of the pack
    pub price: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Inactive plans are hidden from purchase
    pub is_active: bool,
    /// Catalog ordering
    pub sort_order: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl CreditPurchasePlan {
    /// Credits granted by this plan, derived: base + bonus
    pub fn total_credits(&self) -> u64 {
        self.base_credits + self.bonus_credits
    }
}

/// Plan catalog errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Plan id unknown or inactive
    #[error("credit purchase plan not found")]
    NotFound,
    /// Field-level constraint violation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Credit pack catalog
pub struct PlanCatalog {
    plans: Arc<RwLock<HashMap<PlanId, CreditPurchasePlan>>>,
}

impl PlanCatalog {
    pub fn new() -> Self {
        let catalog = Self {
            plans: Arc::new(RwLock::new(HashMap::new())),
        };
        catalog.load_default_plans();
        catalog
    }

    /// Empty catalog, no seeded plans
    pub fn empty() -> Self {
        Self {
            plans: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn load_default_plans(&self) {
        let mut plans = self.plans.write();
        let now = Utc::now();

        let starter = CreditPurchasePlan {
            id: Uuid::new_v4(),
            name: "Starter".into(),
            base_credits: 500,
            bonus_credits: 0,
            price: dec!(499),
            currency: "BDT".into(),
            is_active: true,
            sort_order: 1,
            created_at: now,
        };
        let value = CreditPurchasePlan {
            id: Uuid::new_v4(),
            name: "Value".into(),
            base_credits: 2000,
            bonus_credits: 200,
            price: dec!(1799),
            currency: "BDT".into(),
            is_active: true,
            sort_order: 2,
            created_at: now,
        };
        let bulk = CreditPurchasePlan {
            id: Uuid::new_v4(),
            name: "Bulk".into(),
            base_credits: 5000,
            bonus_credits: 1000,
            price: dec!(3999),
            currency: "BDT".into(),
            is_active: true,
            sort_order: 3,
            created_at: now,
        };

        plans.insert(starter.id, starter);
        plans.insert(value.id, value);
        plans.insert(bulk.id, bulk);
    }

    fn validate(base_credits: u64, price: Decimal) -> Result<(), PlanError> {
        if base_credits == 0 {
            return Err(ValidationError::new("base_credits", "must be >= 1").into());
        }
        if price < dec!(0) {
            return Err(ValidationError::new("price", "must not be negative").into());
        }
        Ok(())
    }

    /// Create a plan (admin operation)
    pub fn create(
        &self,
        name: &str,
        base_credits: u64,
        bonus_credits: u64,
        price: Decimal,
        currency: &str,
    ) -> Result<CreditPurchasePlan, PlanError> {
        Self::validate(base_credits, price)?;
        let mut plans = self.plans.write();
        let plan = CreditPurchasePlan {
            id: Uuid::new_v4(),
            name: name.into(),
            base_credits,
            bonus_credits,
            price,
            currency: currency.into(),
            is_active: true,
            sort_order: plans.len() as u32 + 1,
            created_at: Utc::now(),
        };
        plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    /// Edit a plan's name, credits or price (admin operation)
    pub fn update(
        &self,
        id: PlanId,
        name: &str,
        base_credits: u64,
        bonus_credits: u64,
        price: Decimal,
    ) -> Result<CreditPurchasePlan, PlanError> {
        Self::validate(base_credits, price)?;
        let mut plans = self.plans.write();
        let plan = plans.get_mut(&id).ok_or(PlanError::NotFound)?;
        plan.name = name.into();
        plan.base_credits = base_credits;
        plan.bonus_credits = bonus_credits;
        plan.price = price;
        Ok(plan.clone())
    }

    /// Hide a plan from purchase (admin operation)
    pub fn deactivate(&self, id: PlanId) -> Result<(), PlanError> {
        let mut plans = self.plans.write();
        let plan = plans.get_mut(&id).ok_or(PlanError::NotFound)?;
        plan.is_active = false;
        Ok(())
    }

    /// Get a plan by id regardless of activation (admin screens)
    pub fn get(&self, id: PlanId) -> Result<CreditPurchasePlan, PlanError> {
        self.plans
            .read()
            .get(&id)
            .cloned()
            .ok_or(PlanError::NotFound)
    }

    /// Get an active plan by id
    pub fn get_active(&self, id: PlanId) -> Result<CreditPurchasePlan, PlanError> {
        self.plans
            .read()
            .get(&id)
            .filter(|p| p.is_active)
            .cloned()
            .ok_or(PlanError::NotFound)
    }

    /// Active plans in catalog order
    pub fn list_active(&self) -> Vec<CreditPurchasePlan> {
        let mut plans: Vec<_> = self
            .plans
            .read()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.sort_order);
        plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new()
    }
}
