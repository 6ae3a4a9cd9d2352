// trustedhtml/src/lib.rs
//! # TrustedHTML CLI Application
//!
//! This crate provides the command-line front end for `trustedhtml-core`:
//! it reads an HTML fragment, sanitizes it against the default policy (or a
//! user policy merged over it) and writes the result as HTML, plain text or
//! JSON.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod ui;
