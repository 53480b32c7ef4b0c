//! Board synchronization core.
//!
//! ## Overview
//!
//! Keeps one board's columns and tasks consistent between an in-memory
//! cache, the remote store that is the source of truth, and the change
//! feed that store pushes to every client editing the same board. Local
//! edits are applied optimistically and rolled back if the remote write
//! fails; remote events are folded in as they arrive, echoes included.
//!
//! ## Module Map
//!
//! ```text
//!  intent ──> engine.rs  (Engine, PendingMutation, rollback)
//!               │  apply: store.rs (EntityStore) + position.rs (allocate)
//!               │  commit: gateway.rs (RemoteGateway trait)
//!               v
//!           remote.rs  (SqliteGateway) ── db.rs (DbHandle, RemoteDb)
//!               │
//!               │ every committed write
//!               v
//!           feed.rs  (ChangeFeed, broadcast → per-board Subscription)
//!               │
//!               v
//!           reconciler.rs  (apply_event, drain task) ──> store.rs
//!               │
//!               v
//!           context.rs  (BoardContext: revision watch = re-render hook)
//! ```
//!
//! ## Supporting Modules
//!
//! | Module         | Responsibility                                         |
//! |----------------|--------------------------------------------------------|
//! | `models`       | `Board`, `Column`, `Task`, `Row`, `ChangeEvent`, views |
//! | `session`      | Active board, switch/create/rename/delete, bootstrap   |
//! | `client_state` | Persisted last-active board per account (SQLite)       |
//! | `client`       | `BoardClient`: one account's session plus engine       |

pub mod client;
pub mod client_state;
pub mod context;
pub mod db;
pub mod engine;
pub mod feed;
pub mod gateway;
pub mod models;
pub mod position;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod store;

pub use client::BoardClient;
pub use context::BoardContext;
pub use engine::Engine;
pub use gateway::{RemoteGateway, Subscription};
pub use models::*;
pub use remote::SqliteGateway;
pub use session::BoardSession;
pub use store::EntityStore;
