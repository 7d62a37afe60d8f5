// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # effect-tuner
//!
//! Natural-language parameter adjustment for live particle effects.
//!
//! An operator describes a change ("make the flame bigger and redder"); the
//! engine asks a reasoning service to turn that into typed parameter
//! changes, checks them against the effect's schema, and applies them with
//! rollback if any write fails.
//!
//! ## Architecture
//!
//! - **Parameter store** (`store`, `param`): typed get/set over an effect instance's named parameters
//! - **Registry** (`registry`): creation-ordered effect listing and index → handle resolution
//! - **Schema** (`schema`): per-instance catalog and point-in-time snapshot
//! - **Translation** (`translate`): prompt, reasoning service call, response grammar
//! - **Validation** (`validate`): name/type checks and range clamping, pure
//! - **Execution** (`execute`): sequential apply with rollback
//! - **Cycle** (`adjust`): one guarded cycle per effect, plus a worker thread handoff
//! - **Host** (`host`): in-memory reference host, presets, scene files
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use effect_tuner::adjust::Adjuster;
//! use effect_tuner::host::MemoryHost;
//! use effect_tuner::registry::ComponentRegistry;
//! use effect_tuner::translate::Translator;
//! use effect_tuner::translate::service::{ChatCompletionsService, ServiceConfig};
//!
//! let host = Arc::new(MemoryHost::with_presets().unwrap());
//! let registry = ComponentRegistry::new(host.clone());
//! let handle = registry.resolve(0).unwrap();
//!
//! let service = ChatCompletionsService::from_env(ServiceConfig::default());
//! let adjuster = Adjuster::new(host, Translator::new(Arc::new(service), 64 * 1024));
//! let result = adjuster
//!     .adjust(handle, "make the flame bigger and redder", Duration::from_secs(30))
//!     .unwrap();
//! for change in &result.applied {
//!     println!("{}: {} -> {}", change.name, change.old, change.new);
//! }
//! ```

pub mod adjust;
pub mod config;
pub mod error;
pub mod execute;
pub mod host;
pub mod param;
pub mod paths;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod store;
pub mod translate;
pub mod validate;
