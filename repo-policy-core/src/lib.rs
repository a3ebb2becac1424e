#![doc = "repo-policy-core: core logic library for repo-policy."]

//! This crate contains the document model, the merge engine, the convention
//! registry and the hook driver shared by every repo-policy hook.
//! The CLI crate only parses flags and builds a [`config::ConventionProfile`].
//!
//! # Usage
//! Build registry entries with [`registry::profile_for`] and hand them to
//! [`driver::run`]; the returned [`report::RunOutcome`] carries the exit status.

pub mod config;
pub mod contract;
pub mod document;
pub mod driver;
pub mod error;
pub mod merge;
pub mod registry;
pub mod report;
pub mod transform;
