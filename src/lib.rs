//! # wikisync
//!
//! A content sync and ingestion engine for wiki-style knowledge bases.
//!
//! wikisync incrementally mirrors spaces from a remote wiki into a local
//! SQLite store shaped for retrieval: page bodies are converted from the
//! wiki's storage markup to Markdown, relationship metadata (issue refs,
//! mentions, links, attachments) is extracted, and the Markdown is split
//! into section-aware chunks that are replaced atomically so search never
//! sees a page half-updated.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Change feed │──▶│ Detect + Sync │──▶│   SQLite    │
//! │ (wiki API)  │   │ convert/chunk │   │ pages+chunks│
//! └────────────┘   └───────┬───────┘   └──────┬──────┘
//!                          │                  │
//!                     ┌────▼─────┐       ┌────▼────┐
//!                     │ Reconcile │       │   CLI   │
//!                     │ deletions │       │(wikisync)│
//!                     └──────────┘       └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wikisync init                  # create database
//! wikisync sync eng              # sync the configured "eng" source
//! wikisync status eng            # last run's metrics
//! wikisync reconcile eng         # force a deletion pass
//! wikisync delete-source eng     # remove a source and its data
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`feed`] | Remote change-feed client and retry policy |
//! | [`detect`] | Checkpoint-based change detection |
//! | [`markup`] | Storage markup → Markdown conversion |
//! | [`table`] | Table flattening for retrieval |
//! | [`metadata`] | Tiered cross-reference extraction |
//! | [`chunk`] | Section-aware Markdown chunking |
//! | [`replace`] | Zero-downtime chunk replacement |
//! | [`reconcile`] | Deletion reconciliation |
//! | [`sync`] | Run orchestration |
//! | [`runs`] | Run lifecycle (trigger, status, delete) |
//! | [`store`] | Page and chunk persistence traits |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod feed;
pub mod markup;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod replace;
pub mod runs;
pub mod store;
pub mod sync;
pub mod table;

pub mod testing;
