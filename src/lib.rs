// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are forbidden
#![warn(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # plangraph
//!
//! A dependency-graph planning engine for declarative infrastructure.
//!
//! ## Overview
//!
//! plangraph turns a declarative configuration and the recorded state of
//! previously created objects into a plan of changes, and later applies
//! that plan:
//!
//! - Resolve the references between configuration objects
//! - Build a dependency graph through a pipeline of transformers
//! - Walk the graph concurrently, planning each object through its provider
//! - Seal the results into an immutable, serializable plan
//! - Apply a saved plan after checking it is still valid
//!
//! ## Architecture
//!
//! 1. **Configuration**: `plangraph.yaml`, lowered into typed expressions
//! 2. **Graph**: one node per configuration object, edges from references
//! 3. **Walk**: parallel execution in dependency order with failure propagation
//! 4. **Plan**: per-object changes, deferrals, checks and action invocations
//!
//! ## Modules
//!
//! - [`addrs`]: Absolute addresses of configuration objects
//! - [`lang`]: Expressions, values and reference resolution
//! - [`config`]: Configuration parsing, validation and engine settings
//! - [`provider`]: The provider boundary and the in-memory test provider
//! - [`graph`]: Graph model and transformers
//! - [`walk`]: Concurrent graph walker
//! - [`plans`]: Change and plan model, plan file codec
//! - [`planner`]: Plan and apply orchestration
//! - [`state`]: State storage
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! providers:
//!   - name: test
//!
//! variables:
//!   - name: size
//!     default: 2
//!
//! resources:
//!   - type: test_resource
//!     name: web
//!     count: var.size
//!     config:
//!       value: "web-${count.index}"
//!
//! outputs:
//!   - name: first_id
//!     value: test_resource.web[0].id
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod addrs;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod lang;
pub mod planner;
pub mod plans;
pub mod provider;
pub mod state;
pub mod walk;

// ============================================================================
// Re-exports
// ============================================================================

pub use addrs::Address;
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Config, ConfigHasher, ConfigParser, ConfigValidator, EngineSettings};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{PlanGraphError, Result};
pub use graph::{FrozenGraph, GraphBuilder};
pub use planner::{ApplyOptions, ApplyOutcome, PlanOptions, Planner};
pub use plans::{Action, Plan, PlanMode, PlanStatus};
pub use provider::{Provider, ProviderRegistry, TestProvider};
pub use state::{LocalStateStore, State, StateStore};
pub use walk::{WalkReport, Walker};
