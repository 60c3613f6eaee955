//! Layout page invalidation.
//!
//! Change notifications arrive for arbitrary descendants of header and footer
//! pages. Each change is resolved to its page root, the page is expanded into
//! its rendering cache keys, and every key is evicted from the cache engine:
//!
//! ```text
//! /content/layout-wcm/headers/global/jcr:content/title      (CHANGED)
//!   -> /content/layout-wcm/headers/global                   (page identity)
//!   -> /content/layout-wcm/headers/global/jcr:content.content.html
//!   -> /content/layout-wcm/headers/global/jcr:content.content.html[CookieKeyValues:user-group=anonymous]
//!   -> ...one variant per configured dimension value
//! ```
//!
//! ## Configuration
//!
//! Controlled via the `[invalidation]` table of `layout-flush.toml`:
//!
//! ```toml
//! [invalidation]
//! watch_root = "/content/layout-wcm"
//! categories = ["headers", "footers"]
//! dimension_values = ["anonymous", "authenticated"]
//! # ... see config.rs for all options
//! ```

mod config;
mod dispatcher;
mod engine;
mod events;
mod extension;
mod keys;
mod planner;
mod resolver;

pub use config::{DIMENSION_PLACEHOLDER, InvalidationConfig, VALUE_PLACEHOLDER};
pub use dispatcher::{DispatchReport, InvalidationDispatcher, InvalidationFailure};
pub use engine::{CacheEngine, EngineError};
pub use events::{ChangeEvent, ChangeKind, UnknownChangeKind};
pub use extension::{ExtensionSet, PageCacheExtension};
pub use keys::{CacheKey, DerivedKey, KeyRole, KeyScheme};
pub use planner::{InvalidationPlan, PlannedKey, PlannedPage};
pub use resolver::{PageIdentity, PathResolver, ResolverError};
