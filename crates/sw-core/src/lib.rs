//! AdSweep Core Library
//!
//! Platform-independent logic for the AdSweep content blocker. Everything
//! that touches the browser goes through a small trait at the seam, so the
//! same code runs inside the extension (see `sw-wasm`), in the CLI and in
//! tests.
//!
//! # Architecture
//!
//! Three components share one persistent key-value store and never talk to
//! each other directly:
//!
//! - the [`Coordinator`] owns `enabled` and `blockedCount`, toggles the
//!   network rule set and keeps the badge current;
//! - one [`PageSuppressor`] per page removes ad-like elements while
//!   `enabled` is true;
//! - the [`ControlSurface`] renders status for the popup and sends commands
//!   to the coordinator.
//!
//! # Modules
//!
//! - `store`: store keys, records, change notifications and the `Store` trait
//! - `message`: request/response protocol between popup and coordinator
//! - `coordinator`: authoritative toggle state, counter and badge
//! - `patterns`: versioned selector/hostname lists and the hide stylesheet
//! - `page`: `Document` and `Scheduler` seams used by the suppressor
//! - `suppressor`: per-page Active/Inactive state machine and passes
//! - `surface`: popup view model
//! - `html`: off-browser `Document` over static HTML (feature `html`)

pub mod config;
pub mod coordinator;
pub mod message;
pub mod page;
pub mod patterns;
pub mod store;
pub mod suppressor;
pub mod surface;

#[cfg(feature = "html")]
pub mod html;

// Re-export commonly used types
pub use config::{BadgeColors, SuppressorConfig, SurfaceConfig};
pub use coordinator::{Badge, Coordinator, Indicator, RuleSets, AD_RULESET_ID};
pub use message::{Command, Response, StatusResponse, ToggleResponse, ResetResponse};
pub use page::{Document, ElementView, MutationBatch, PageError, Scheduler};
pub use patterns::{PatternError, PatternSet};
pub use store::{MemoryStore, ProtectionStatus, Store, StoreChange, StoreError, StoreKey, StoreRecord};
pub use suppressor::{PageEvent, PageSuppressor, PassStats, Passes, SuppressorState};
pub use surface::{Channel, ControlSurface, PopupView};
