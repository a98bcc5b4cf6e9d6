//! Testing utilities for the Carto workspace
//!
//! Shared test helpers: a scripted in-process worker launcher and
//! expression tree fixtures.

#![allow(missing_docs)]

pub mod launcher;
pub mod trees;

pub use launcher::{Behaviour, Outcome, ScriptedLauncher};
pub use trees::{arb_tree, sample_tree};
