//! Tests for the import merge resolver.
//!
//! Organized by functionality:
//! - Native entries only
//! - Include/exclude filters
//! - Label rewriting across imports
//! - Missing imports and single-level resolution


mod merge_tests;
