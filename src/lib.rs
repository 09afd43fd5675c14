//! Pinrelay: build/upload handoff and reuse resolution for paid publishing
//!
//! A CI pipeline builds content in one job and publishes it to a paid storage
//! network in another. Pinrelay carries a single context record between the
//! two, decides when an earlier publish can be reused instead of paid for, and
//! bounds how much the ledger may be topped up per run.

pub mod channel;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod pack;
pub mod payment;
pub mod publish;
pub mod report;
pub mod reuse;
pub mod trigger;
pub mod types;
