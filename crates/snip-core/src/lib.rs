//! Core types and traits for the snip link store.
//!
//! This crate provides the link model, the store contract and the error
//! taxonomy shared by the storage backends and the shortener service.

pub mod batch;
pub mod error;
pub mod shortcode;
pub mod store;

pub use error::{Result, StoreError};
pub use shortcode::{ShortCode, UserId};
pub use store::{LinkPair, LinkRef, ReadStore, ShortLink, Store, StoreStats};
