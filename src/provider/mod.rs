//! The provider boundary.
//!
//! This module provides:
//! - Schema types describing what a provider supports
//! - Conversion from the wire schema messages providers send
//! - The async [`Provider`] trait and a [`ProviderRegistry`]
//! - A machine-readable JSON rendering of provider schemas
//! - An in-memory [`testing::TestProvider`]

pub mod convert;
pub mod interface;
pub mod json;
pub mod schema;
pub mod testing;

pub use interface::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ImportResourceResponse, ImportedResource,
    PlanResourceChangeRequest, PlanResourceChangeResponse, Provider, ProviderRegistry, ReadDataSourceResponse,
    ReadResourceRequest, ReadResourceResponse,
};
pub use schema::{
    ActionKind, ActionSchema, Attribute, AttributeType, Block, ExecutionOrder, NestedBlock, NestingMode,
    ProviderSchema, Schema,
};
pub use json::ProviderSchemasJson;
pub use testing::{ResourceStore, TestProvider};
