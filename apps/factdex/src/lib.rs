//! # factdex
//!
//! Command-line front end for factdex-core: configuration loading and the
//! command implementations, exposed as a library so they can be tested
//! without spawning the binary.

pub mod cli;
pub mod config;
