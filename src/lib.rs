//! Decoy Gateway
//!
//! Detects automated scrapers and feeds them procedurally generated decoy
//! pages instead of real content.
//!
//! # Features
//!
//! - Agent allow/deny lists refreshed from a settings store
//! - Per-visitor sliding-window rate limiting with restart warmup
//! - Explicit trigger parameter for previewing decoy treatment
//! - Deterministic Markov-chain page generation and in-place scrambling
//! - Fire-and-forget audit logging of every decision
//!
//! # Example
//!
//! ```ignore
//! use decoy_gateway::{ClassifyRequest, DecoyGateway, GatewayConfig};
//! use decoy_gateway::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let gateway = DecoyGateway::new(GatewayConfig::default(), store).await?;
//! let result = gateway.classify(&ClassifyRequest::new("/", ua, ip)).await;
//! if result.blocked {
//!     let (html, content_type) = gateway.render_decoy_page("/");
//! }
//! ```

pub mod agents;
pub mod config;
pub mod decision;
pub mod gateway;
pub mod markov;
pub mod rate;
pub mod rng;
pub mod store;
pub mod visitor;

pub use config::GatewayConfig;
pub use decision::{BlockReason, DetectionResult};
pub use gateway::{start_background_tasks, BackgroundTasks, ClassifyRequest, DecoyGateway};
pub use markov::{MarkovIndex, MarkovStats, TextGenerator};
pub use rate::{RateCheck, RateLimiter};
pub use store::{CachedSettings, MemoryStore, RequestLogEntry, SettingsStore};
