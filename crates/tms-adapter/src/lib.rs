//! Result aggregation and reporting core for a remote Test Management System.
//!
//! A host test runtime drives [`AdapterManager`] with lifecycle events
//! (run/container/test/fixture start and stop); the manager aggregates them
//! into an in-memory entity tree and, as subtrees complete, hands them to a
//! [`Writer`] that synchronizes them to the TMS: ensuring autotest
//! definitions exist, reconciling work-item links, submitting results, and
//! patching in container-scoped fixture data after the fact.

pub mod config;
pub mod context;
pub mod convert;
pub mod entities;
pub mod manager;
pub mod store;
pub mod writer;

pub use config::{AdapterConfig, AdapterMode, ClientConfig, ConfigManager, parse_properties};
pub use context::ExecutionContext;
pub use entities::{
    ClassContainer, EntityId, FixtureResult, ItemStage, ItemStatus, Label, LinkItem, LinkType,
    RunContainer, StepResult, TestResult, external_id, now_millis,
};
pub use manager::AdapterManager;
pub use store::{Entity, EntityStore, StoreError};
pub use writer::{HttpWriter, Writer};
