//! Payment guard: bounded top-up computation.
//!
//! The two caps behave differently on purpose. A balance cap clamps the top-up
//! so the balance never exceeds it; a top-up cap rejects outright and is never
//! clamped to.

use crate::error::LedgerError;
use crate::types::TokenAmount;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Inputs for one funding decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub current_balance: TokenAmount,
    pub target_runway_days: u64,
    /// Cost per day reported by the ledger
    pub runway_rate: TokenAmount,
    pub max_balance: Option<TokenAmount>,
    pub max_top_up: Option<TokenAmount>,
}

/// Why a top-up was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FundingRejection {
    /// The required top-up is above the per-run top-up cap
    ExceedsCap {
        required: TokenAmount,
        cap: TokenAmount,
    },
}

impl fmt::Display for FundingRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingRejection::ExceedsCap { required, cap } => {
                write!(f, "exceeds-cap (required {}, cap {})", required, cap)
            }
        }
    }
}

/// Outcome of [`PaymentGuard::authorize`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingDecision {
    /// Amount to deposit; zero when rejected or when nothing is needed
    pub top_up: TokenAmount,
    pub rejected: bool,
    pub reason: Option<FundingRejection>,
}

impl FundingDecision {
    fn authorized(top_up: TokenAmount) -> Self {
        Self {
            top_up,
            rejected: false,
            reason: None,
        }
    }

    fn rejected(reason: FundingRejection) -> Self {
        Self {
            top_up: TokenAmount::ZERO,
            rejected: true,
            reason: Some(reason),
        }
    }

    pub fn needs_deposit(&self) -> bool {
        !self.rejected && !self.top_up.is_zero()
    }
}

/// Stateless spend guard
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentGuard;

impl PaymentGuard {
    /// Decide how much may be deposited for `request`.
    ///
    /// Fails only when the runway cost overflows and no cap bounds it.
    pub fn authorize(request: &FundingRequest) -> Result<FundingDecision, LedgerError> {
        let balance = request.current_balance;

        // None: the runway cost overflowed, so the requirement is unbounded.
        let mut required = request
            .runway_rate
            .checked_mul(request.target_runway_days)
            .map(|needed| needed.saturating_sub(balance));

        if let Some(cap) = request.max_balance {
            if balance >= cap {
                debug!(balance = %balance, cap = %cap, "Balance at or above cap; no top-up");
                required = Some(TokenAmount::ZERO);
            } else {
                let headroom = cap.saturating_sub(balance);
                let over_cap = match required {
                    Some(amount) => amount > headroom,
                    None => true,
                };
                if over_cap {
                    debug!(headroom = %headroom, "Clamping top-up to balance cap");
                    required = Some(headroom);
                }
            }
        }

        if let Some(cap) = request.max_top_up {
            let exceeds = match required {
                Some(amount) => amount > cap,
                None => true,
            };
            if exceeds {
                let required = required.unwrap_or(TokenAmount::from_base_units(u128::MAX));
                warn!(required = %required, cap = %cap, "Top-up exceeds cap; refusing");
                return Ok(FundingDecision::rejected(FundingRejection::ExceedsCap {
                    required,
                    cap,
                }));
            }
        }

        let top_up = required.ok_or(LedgerError::Overflow {
            days: request.target_runway_days,
            rate: request.runway_rate,
        })?;
        info!(top_up = %top_up, balance = %balance, "Top-up authorized");
        Ok(FundingDecision::authorized(top_up))
    }
}

/// Whole days of runway `balance` buys at `rate` per day; `None` when the
/// rate is zero.
pub fn runway_days(balance: TokenAmount, rate: TokenAmount) -> Option<u64> {
    if rate.is_zero() {
        return None;
    }
    let days = balance.base_units() / rate.base_units();
    Some(u64::try_from(days).unwrap_or(u64::MAX))
}
