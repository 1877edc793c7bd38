//! # fabricctl-core
//!
//! Engine layer for declarative Microsoft Fabric tooling: an authenticated
//! client for the Fabric and Power BI REST APIs, with the pieces every
//! resource handler needs.
//!
//! - **[`auth`]** - client-credentials token acquisition, caching and
//!   file-backed persistence
//! - **[`client`]** - the HTTP executor with per-verb status classification
//! - **[`progress`]** - bounded polling of long-running operations
//! - **[`reconcile`]** - add/update/remove planning for membership sets
//! - **[`assignments`]** - workspace users, semantic model users and domain
//!   workspaces on top of the reconciler
//! - **[`workflows`]** - multi-step operations (git sync, capacity moves,
//!   eventstream and lakehouse creation)
//! - **[`config`]** - TOML profiles with keyring and environment support
//!
//! ## Example
//!
//! ```rust,ignore
//! use fabricctl_core::config::Config;
//! use fabricctl_core::assignments::{update_workspace_users, WorkspaceUser};
//!
//! let client = Config::load()?.build_client(None)?;
//!
//! let report = update_workspace_users(
//!     &client,
//!     "ws-1",
//!     &[WorkspaceUser::new("a@contoso.com", "Admin")],
//!     &[WorkspaceUser::new("a@contoso.com", "Member")],
//! )
//! .await?;
//! assert!(report.is_converged());
//! ```
//!
//! Logging goes through `tracing`; installing a subscriber is up to the host.

pub mod assignments;
pub mod auth;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod policy;
pub mod progress;
pub mod reconcile;
pub mod workflows;

pub use auth::{Credentials, TokenStore, TokenStoreOptions};
pub use client::{ApiResponse, FabricClient, FabricClientBuilder, Verb};
pub use endpoints::Endpoints;
pub use error::{FabricError, Result};
pub use policy::{NoRetryPolicy, RetryPolicy};
pub use progress::{PollConfig, ProgressCallback, ProgressEvent, poll_operation};
pub use reconcile::{Member, MembershipBackend, ReconcilePlan, ReconcileReport, ReconcileState};

// Re-export for hosts that pass cancellation tokens
pub use tokio_util::sync::CancellationToken;
