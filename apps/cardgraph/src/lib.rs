//! # cardgraph
//!
//! Command line loader for card transaction datasets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  apps/cardgraph (THE BINARY)                 │
//! │                                                              │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │   CLI   │──▶│  config  │   │  prompt  │   │  report   │  │
//! │  │ (clap)  │   │  (toml)  │   │ (stdin)  │   │ (tracing) │  │
//! │  └────┬────┘   └──────────┘   └──────────┘   └───────────┘  │
//! │       ▼                                                      │
//! │  ┌────────────────┐        ┌──────────────────────────┐     │
//! │  │ cardgraph-core │◀──────▶│ neo4j (neo4rs via tokio) │     │
//! │  │  (THE LOGIC)   │        └──────────────────────────┘     │
//! │  └────────────────┘                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod neo4j;
pub mod prompt;
pub mod report;
