//! Property-based tests for hashing, identity, merging and funding guarantees

mod funding_caps;
