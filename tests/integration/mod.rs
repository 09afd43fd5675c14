//! Integration tests for the pinrelay pipeline

mod config_integration;
mod phase_scenarios;
mod test_utils;
