//! Reactive cache invalidation for layout pages.
//!
//! Change notifications for content resources are resolved to the page they
//! belong to and fanned out into the base and per-dimension cache keys that
//! must be evicted from the rendering cache.

pub mod config;
pub mod error;
pub mod feed;
pub mod infra;
pub mod invalidation;
