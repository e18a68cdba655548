//! # Fanout DAC
//!
//! Content record service on top of `fanout-storage`: an app hands it the
//! content its user created or interacted with, and the service appends one
//! entry per event to the app's fanout logs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fanout_dac::{ContentInfo, ContentRecordService, DacConfig};
//! use fanout_storage::{InMemoryGateway, LegacyBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(LegacyBackend::new(Arc::new(InMemoryGateway::new())));
//!     let service =
//!         ContentRecordService::init(&DacConfig::default(), "https://myapp.hns.siasky.net/", backend)
//!             .unwrap();
//!
//!     service.on_user_login();
//!     let result = service
//!         .record_new_content_sync(&ContentInfo::new("sia://abc"))
//!         .await;
//!     assert!(result.success);
//! }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod types;

pub use config::DacConfig;
pub use domain::extract_domain;
pub use error::DacError;
pub use service::{ContentRecordService, LoginOutcome, LoginTasks};
pub use types::{ContentInfo, DacResponse, RecordResult};
