//! Service registry and lifecycle orchestration for Flotilla projects.
//!
//! A [`Project`](project::Project) owns the services of one namespace in
//! creation order. An [`Orchestrator`](orchestrator::Orchestrator) walks
//! that order (forwards, backwards, or expanded over links) and drives each
//! service against a [`RuntimeClient`](client::RuntimeClient).

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod builder;
pub mod client;
pub mod container;
pub mod docker;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod project;
pub mod service;
