//! Mess Credits Ledger
//!
//! One balance record per mess (tenant). The available balance is derived at
//! read time from `total - used`, never stored, and the sufficiency check of
//! a deduction shares one write-lock critical section with the decrement so
//! concurrent deductions cannot overdraw a tenant.

use mess_common::MessId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Ledger status of a mess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    /// Normal, paying tenant
    Active,
    /// Admin-suspended; paid features refused regardless of balance
    Suspended,
    /// Inside a trial window
    Trial,
    /// Trial ended without purchase
    Expired,
}

/// Per-tenant credit balance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessCredits {
    /// Owning mess
    pub mess_id: MessId,
    /// Lifetime credits granted (purchases, bonuses, trial grants)
    pub total_credits: u64,
    /// Lifetime credits consumed
    pub used_credits: u64,
    /// Ledger status
    pub status: LedgerStatus,
    /// Whether a trial window has been opened and not closed
    pub is_trial_active: bool,
    /// Trial window start
    pub trial_start: Option<DateTime<Utc>>,
    /// Trial window end
    pub trial_end: Option<DateTime<Utc>>,
    /// Current billing period start
    pub current_period_start: DateTime<Utc>,
    /// Current billing period end
    pub current_period_end: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl MessCredits {
    fn new(mess_id: MessId) -> Self {
        let now = Utc::now();
        Self {
            mess_id,
            total_credits: 0,
            used_credits: 0,
            status: LedgerStatus::Active,
            is_trial_active: false,
            trial_start: None,
            trial_end: None,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            created_at: now,
            updated_at: now,
        }
    }

    /// Spendable balance, derived on read: `total - used`, floored at 0
    pub fn available_credits(&self) -> u64 {
        self.total_credits.saturating_sub(self.used_credits)
    }

    /// Whether the trial window has lapsed
    pub fn is_trial_expired(&self) -> bool {
        self.is_trial_expired_at(Utc::now())
    }

    /// Trial expiry against an explicit clock
    pub fn is_trial_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_trial_active && self.trial_end.map(|end| now > end).unwrap_or(false)
    }

    /// Paid features are reachable with a positive balance or a live trial
    pub fn can_access_paid_features(&self) -> bool {
        self.can_access_paid_features_at(Utc::now())
    }

    /// Feature access against an explicit clock
    pub fn can_access_paid_features_at(&self, now: DateTime<Utc>) -> bool {
        if self.status == LedgerStatus::Suspended {
            return false;
        }
        self.available_credits() > 0
            || (self.is_trial_active && !self.is_trial_expired_at(now))
    }
}

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Deduction refused; the record is left untouched
    #[error("insufficient credits: {available} available, {requested} requested")]
    InsufficientCredits {
        /// Balance at the time of the refused deduction
        available: u64,
        /// Amount that was requested
        requested: u64,
    },
    /// Zero or otherwise unusable amount
    #[error("credit amount must be positive")]
    InvalidAmount,
    /// No ledger record for the mess
    #[error("no credit ledger for mess")]
    NotFound,
}

/// Ledger manager, one `MessCredits` record per mess
pub struct LedgerManager {
    ledgers: Arc<RwLock<HashMap<MessId, MessCredits>>>,
}

impl LedgerManager {
    pub fn new() -> Self {
        Self {
            ledgers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the ledger record for a mess
    pub fn open(&self, mess_id: MessId) -> MessCredits {
        let mut ledgers = self.ledgers.write();
        ledgers
            .entry(mess_id)
            .or_insert_with(|| MessCredits::new(mess_id))
            .clone()
    }

    /// Get the ledger record for a mess
    pub fn get(&self, mess_id: MessId) -> Result<MessCredits, LedgerError> {
        self.ledgers
            .read()
            .get(&mess_id)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    /// Grant credits to a mess. `amount` must be positive.
    pub fn add_credits(&self, mess_id: MessId, amount: u64) -> Result<MessCredits, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut ledgers = self.ledgers.write();
        let ledger = ledgers
            .entry(mess_id)
            .or_insert_with(|| MessCredits::new(mess_id));
        ledger.total_credits += amount;
        ledger.updated_at = Utc::now();
        tracing::info!(%mess_id, amount, available = ledger.available_credits(), "credits added");
        Ok(ledger.clone())
    }

    /// Consume credits from a mess. The sufficiency check and the decrement
    /// run under the same write lock, so a refused deduction leaves the
    /// record untouched and two racing deductions cannot both pass.
    pub fn deduct_credits(&self, mess_id: MessId, amount: u64) -> Result<MessCredits, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut ledgers = self.ledgers.write();
        let ledger = ledgers.get_mut(&mess_id).ok_or(LedgerError::NotFound)?;
        let available = ledger.available_credits();
        if available < amount {
            tracing::warn!(%mess_id, available, requested = amount, "deduction refused");
            return Err(LedgerError::InsufficientCredits {
                available,
                requested: amount,
            });
        }
        ledger.used_credits += amount;
        ledger.updated_at = Utc::now();
        tracing::info!(%mess_id, amount, available = ledger.available_credits(), "credits deducted");
        Ok(ledger.clone())
    }

    /// Open a trial window for a mess
    pub fn start_trial(&self, mess_id: MessId, days: i64) -> Result<MessCredits, LedgerError> {
        if days <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut ledgers = self.ledgers.write();
        let ledger = ledgers
            .entry(mess_id)
            .or_insert_with(|| MessCredits::new(mess_id));
        let now = Utc::now();
        ledger.is_trial_active = true;
        ledger.trial_start = Some(now);
        ledger.trial_end = Some(now + Duration::days(days));
        ledger.status = LedgerStatus::Trial;
        ledger.updated_at = now;
        Ok(ledger.clone())
    }

    /// Admin suspension; blocks paid features until reactivated
    pub fn suspend(&self, mess_id: MessId) -> Result<(), LedgerError> {
        self.set_status(mess_id, LedgerStatus::Suspended)
    }

    /// Lift a suspension
    pub fn reactivate(&self, mess_id: MessId) -> Result<(), LedgerError> {
        self.set_status(mess_id, LedgerStatus::Active)
    }

    fn set_status(&self, mess_id: MessId, status: LedgerStatus) -> Result<(), LedgerError> {
        let mut ledgers = self.ledgers.write();
        let ledger = ledgers.get_mut(&mess_id).ok_or(LedgerError::NotFound)?;
        ledger.status = status;
        ledger.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for LedgerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_add_then_deduct() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        ledger.add_credits(mess, 100).unwrap();
        let after = ledger.deduct_credits(mess, 60).unwrap();
        assert_eq!(after.total_credits, 100);
        assert_eq!(after.used_credits, 60);
        assert_eq!(after.available_credits(), 40);
    }

    #[test]
    fn test_overdraw_refused_without_partial_effect() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        ledger.add_credits(mess, 100).unwrap();
        let before = ledger.get(mess).unwrap();
        let err = ledger.deduct_credits(mess, 150).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCredits {
                available: 100,
                requested: 150
            }
        );
        assert_eq!(ledger.get(mess).unwrap(), before);
    }

    #[test]
    fn test_available_is_derived_and_never_negative() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        ledger.add_credits(mess, 30).unwrap();
        ledger.deduct_credits(mess, 30).unwrap();
        let record = ledger.get(mess).unwrap();
        assert_eq!(record.available_credits(), 0);
        assert!(ledger.deduct_credits(mess, 1).is_err());
        assert_eq!(ledger.get(mess).unwrap().available_credits(), 0);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        assert_eq!(ledger.add_credits(mess, 0), Err(LedgerError::InvalidAmount));
        ledger.add_credits(mess, 10).unwrap();
        assert_eq!(
            ledger.deduct_credits(mess, 0),
            Err(LedgerError::InvalidAmount)
        );
    }

    #[test]
    fn test_trial_expiry() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        ledger.start_trial(mess, 7).unwrap();
        let mut record = ledger.get(mess).unwrap();
        assert!(!record.is_trial_expired());
        assert!(record.can_access_paid_features());

        // Force the window into the past.
        record.trial_end = Some(Utc::now() - Duration::days(1));
        assert!(record.is_trial_expired());
        assert!(!record.can_access_paid_features());

        record.total_credits = 5;
        assert!(record.can_access_paid_features());
    }

    #[test]
    fn test_suspension_blocks_paid_features() {
        let ledger = LedgerManager::new();
        let mess = Uuid::new_v4();
        ledger.add_credits(mess, 100).unwrap();
        ledger.suspend(mess).unwrap();
        assert!(!ledger.get(mess).unwrap().can_access_paid_features());
        ledger.reactivate(mess).unwrap();
        assert!(ledger.get(mess).unwrap().can_access_paid_features());
    }

    #[test]
    fn test_concurrent_deductions_cannot_overdraw() {
        let ledger = Arc::new(LedgerManager::new());
        let mess = Uuid::new_v4();
        ledger.add_credits(mess, 100).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.deduct_credits(mess, 30).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        // 100 / 30 -> at most 3 deductions can succeed.
        assert_eq!(successes, 3);
        let record = ledger.get(mess).unwrap();
        assert_eq!(record.used_credits, 90);
        assert_eq!(record.available_credits(), 10);
    }
}
