//! # Skillbox
//!
//! A semantic skill index and retrieval server for AI agents.
//!
//! Skillbox loads `SKILL.md` bundles from configured sources (local
//! directories, GitHub repositories) into an in-memory embedding index and
//! serves nearest-match queries over it while the collection is mutated in
//! the background: uploads, deletes, and a periodic change-detection
//! refresh all rebuild the snapshot atomically without blocking readers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │   Sources    │──▶│   Ingestion    │──▶│ Semantic Index │
//! │ local/github │   │ batched, bg   │   │ skills+vectors │
//! └──────────────┘   └───────────────┘   └───────┬────────┘
//!        ▲                                       │
//!        │ full reload on change                 │ atomic replace
//! ┌──────┴───────┐   ┌───────────────┐           │
//! │  Scheduler   │   │   Reindex     │───────────┘
//! │ interval+    │──▶│  Coordinator  │◀── upload / delete
//! │ call budget  │   │ (one rebuild) │
//! └──────────────┘   └───────────────┘
//! ```
//!
//! Queries read the index directly and always observe a whole snapshot;
//! all rebuilds serialize through the coordinator's reindex lock.
//!
//! ## Quick Start
//!
//! ```bash
//! skb sources                    # check configured skill sources
//! skb query "analyze csv data"   # one-shot load and query
//! skb serve                      # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | The in-memory semantic index |
//! | [`reindex`] | Serialized snapshot rebuilds |
//! | [`pipeline`] | Background startup ingestion |
//! | [`scheduler`] | Periodic change-detection refresh |
//! | [`refresh`] | Source change detection with a call budget |
//! | [`loader`] | Skill source loaders and `SKILL.md` parsing |
//! | [`storage`] | On-disk storage for uploaded bundles |
//! | [`paths`] | Path containment and slugs |
//! | [`status`] | Loading-state tracking |
//! | [`service`] | The service context handlers consume |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod embedding;
pub mod index;
pub mod loader;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod refresh;
pub mod reindex;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod status;
pub mod storage;
