//! Property-based tests for payment guard bounds

use pinrelay::payment::{FundingRequest, PaymentGuard};
use pinrelay::types::TokenAmount;
use proptest::prelude::*;

fn tokens() -> impl Strategy<Value = TokenAmount> {
    (0u128..10u128.pow(20)).prop_map(TokenAmount::from_base_units)
}

fn request() -> impl Strategy<Value = FundingRequest> {
    (
        tokens(),
        1u64..400,
        tokens(),
        prop::option::of(tokens()),
        prop::option::of(tokens()),
    )
        .prop_map(
            |(current_balance, target_runway_days, runway_rate, max_balance, max_top_up)| {
                FundingRequest {
                    current_balance,
                    target_runway_days,
                    runway_rate,
                    max_balance,
                    max_top_up,
                }
            },
        )
}

/// Test that an authorized top-up never exceeds the top-up cap
#[test]
fn test_top_up_never_exceeds_top_up_cap() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&request(), |request| {
            let decision = PaymentGuard::authorize(&request).unwrap();
            if let Some(cap) = request.max_top_up {
                prop_assert!(decision.top_up <= cap);
            }
            if decision.rejected {
                prop_assert!(decision.top_up.is_zero());
                prop_assert!(decision.reason.is_some());
            }
            Ok(())
        })
        .unwrap();
}

/// Test that a top-up never pushes the balance past the balance cap
#[test]
fn test_top_up_never_crosses_balance_cap() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&request(), |request| {
            let decision = PaymentGuard::authorize(&request).unwrap();
            if let Some(cap) = request.max_balance {
                if request.current_balance >= cap {
                    prop_assert!(decision.top_up.is_zero());
                } else {
                    let after = request.current_balance.checked_add(decision.top_up).unwrap();
                    prop_assert!(after <= cap);
                }
            }
            Ok(())
        })
        .unwrap();
}

/// Test that without caps the top-up reaches the runway target exactly
#[test]
fn test_uncapped_top_up_reaches_target() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(tokens(), 1u64..400, tokens()), |(balance, days, rate)| {
            let request = FundingRequest {
                current_balance: balance,
                target_runway_days: days,
                runway_rate: rate,
                max_balance: None,
                max_top_up: None,
            };
            let decision = PaymentGuard::authorize(&request).unwrap();
            let target = rate.checked_mul(days).unwrap();
            prop_assert!(!decision.rejected);
            prop_assert_eq!(decision.top_up, target.saturating_sub(balance));
            Ok(())
        })
        .unwrap();
}
