//! Link shortening service.
//!
//! [`ShortenerService`] turns urls into short codes on top of any
//! [`snip_core::Store`], retrying code collisions, and runs the background
//! hard-delete sweep through [`LifecycleManager`].

pub mod error;
pub mod lifecycle;
pub mod service;
pub mod settings;

pub use error::ShortenerError;
pub use lifecycle::{LifecycleHandle, LifecycleManager};
pub use service::{BatchRequest, BatchResponse, ShortenerService};
pub use settings::ShortenerSettings;
