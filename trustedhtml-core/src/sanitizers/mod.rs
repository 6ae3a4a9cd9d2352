//! Policy compilation for the HTML sanitizer.
//!
//! This module turns a YAML-level `PolicyConfig` into the immutable
//! `Policy` the sanitizer runs against: validators are built, regular
//! expressions compiled, aliases resolved and style tables shared.

pub mod compiler;
