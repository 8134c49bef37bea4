//! # IgorFS Daemon Library
//!
//! This crate provides the backend of the IGOR dashboard: a read-only view
//! of one shared directory tree, served over HTTP.
//!
//! ## Overview
//!
//! The daemon exposes a single root directory and nothing outside it.
//! It provides:
//!
//! - **Folder Index**: Top-level folders with recursive file counts and sizes
//! - **Folder Listings**: Folder contents, each subfolder decorated with its totals
//! - **Downloads**: Streamed file downloads with range support
//! - **Path Safety**: Every client path is confined to the root boundary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Daemon Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                  HTTP Router (axum)                        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │ Folder Index │  │ Directory Browser│  │  File Transfer   │   │
//! │  └──────────────┘  └──────────────────┘  └──────────────────┘   │
//! │          │                  │                     │             │
//! │  ┌──────────────────────────────────┐             │             │
//! │  │       Directory Aggregator       │             │             │
//! │  └──────────────────────────────────┘             │             │
//! │                                                   │             │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                     Root Boundary                          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration, falling back to defaults
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     // Create and start the orchestrator
//!     let mut orchestrator = DaemonOrchestrator::new(config)?;
//!     let addr = orchestrator.start().await?;
//!     println!("listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Root boundary, aggregation, listings and downloads
//! - [`router`]: HTTP routes and error responses
//! - [`orchestrator`]: Main daemon coordinator

pub mod config;
pub mod files;
pub mod orchestrator;
pub mod router;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export files types for convenience
pub use files::{
    DirectoryAggregator, DirectoryBrowser, FileDownload, FileTransfer, FolderIndex, FsError,
    ResolvedPath, RootBoundary,
};

// Re-export router types for convenience
pub use router::{build_router, AppState};

// Re-export orchestrator types for convenience
pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
