//! # agora-core
//!
//! Connection lifecycle for the Agora broadcast chatroom.
//!
//! - **Manager** - single event loop owning the set of registered clients
//! - **OutboundQueue** - bounded per-client queue fed by the manager
//! - **Pumps** - per-connection read and write tasks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Broadcast  ┌─────────────┐  try_enqueue  ┌───────────────┐
//! │  Read Pump  │────────────▶│   Manager   │──────────────▶│ OutboundQueue │
//! └─────────────┘  Disconnect └─────────────┘               └───────────────┘
//!                                    ▲                              │
//!                                    │ Connect                      ▼
//!                             ┌─────────────┐               ┌───────────────┐
//!                             │  Bootstrap  │               │  Write Pump   │
//!                             └─────────────┘               └───────────────┘
//! ```
//!
//! Only the manager's loop ever touches the client set, so it needs no locks.

pub mod client;
pub mod manager;
pub mod metrics;
pub mod pump;
pub mod queue;

pub use client::{display_name, ClientHandle, DEFAULT_USERNAME};
pub use manager::{Event, Manager, ManagerConfig, ManagerError, ManagerHandle, ManagerStats};
pub use pump::{read_pump, write_pump};
pub use queue::{OutboundQueue, OutboundReceiver, QueueError};
