//! Scenario tests for the inference engine
//!
//! Each test builds a small syntax tree with [`support::Script`], drives the definition,
//! reference and inference passes through the engine's controllers and then inspects the
//! solved types and the reported issues.

#![allow(clippy::assertions_on_constants)]

mod support;

// Type lattice
mod test_promotion_levels;

mod test_initialisation;
mod test_scope_paths;


// Engine lifecycle
mod test_end_to_end;
