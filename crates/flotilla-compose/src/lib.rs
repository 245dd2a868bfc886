//! # flotilla-compose
//!
//! Turns a service configuration mapping into declarations ordered for
//! creation.
//!
//! Handles:
//! - **Declaration**: Validation of configuration entries into
//!   [`ServiceDeclaration`](declaration::ServiceDeclaration)s.
//! - **Reference**: Parsing of `target[:alias]` link and volume references.
//! - **Graph**: Dependency graph construction and topological ordering with
//!   self-reference and cycle detection.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod declaration;
pub mod graph;
pub mod reference;
