//! stowaway-core: load feature bundles into a running host process
//!
//! This crate provides the plugin core a host attaches to at startup:
//!
//! - **Bundle descriptors** - [`descriptor::read`] validates a `bundle.toml` manifest
//! - **Code resolution** - [`CodeResolutionContext`] maps symbols to bundle code, falling back to the host
//! - **Resource overlay** - [`ResourceOverlay`] layers bundle resources over the host's base table
//! - **Component registry** - [`ComponentRegistry`] records which bundle owns which component id
//! - **Dispatch** - [`LifecycleDispatcher`] routes host lifecycle events into bundle code
//! - **Orchestration** - [`PluginManager`] loads, unloads and publishes all of the above
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stowaway_bundle_api::LifecycleEvent;
//! use stowaway_core::{CoreConfig, HostContext, HostHandle, HostTable};
//!
//! let host = Arc::new(HostTable::new());
//! let ctx = HostContext::new(HostHandle::new(&host), CoreConfig::default());
//! let manager = stowaway_core::host::on_host_attach(ctx);
//!
//! match manager.dispatch("svc.alpha", &LifecycleEvent::Start) {
//!     Ok(outcome) => println!("handled: {outcome:?}"),
//!     Err(e) if e.is_routing_miss() => { /* host-native component */ }
//!     Err(e) => eprintln!("dispatch failed: {e}"),
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    PluginManager                     │
//! │   BundleSource ──▶ descriptor::read ──▶ build        │
//! │                                          │ off-lock  │
//! │  ┌───────────────────────────────────────▼─────────┐ │
//! │  │ Snapshot (ArcSwap)                              │ │
//! │  │   bundles ─ registry ─ overlay                  │ │
//! │  └───────────────────────────────────────┬─────────┘ │
//! │                     LifecycleDispatcher ◀┘           │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod manager;
pub mod overlay;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod selection;
pub mod source;

pub use config::CoreConfig;
pub use descriptor::{BundleDescriptor, BundleId, ComponentDeclaration, ComponentKind};
pub use dispatch::{DispatchPhase, LifecycleDispatcher};
pub use error::{DispatchCause, PluginError, SourceError};
pub use host::{HostContext, HostHandle, HostResolver, HostTable};
pub use manager::{BundleInfo, InitReport, LoadFailure, PluginManager};
pub use overlay::{BundleResources, ResourceOverlay, ResourceOverlayEntry};
pub use registry::{ComponentRegistry, RegistrationResult, RegistryEntry, RejectReason};
pub use resolver::{CodePayload, CodeResolutionContext, ModuleCatalog};
pub use selection::BundleSelection;
pub use source::{BundlePayload, BundleSource, DirectorySource, MemorySource};
