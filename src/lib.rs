//! ipgeo - serving infrastructure for IP geolocation APIs.
//!
//! This crate provides the two stateful components behind a "where is this
//! IP" service, leaving HTTP routing, response encoding, and configuration
//! to the embedding application:
//!
//! - **[`GeoDb`]**: a self-updating store for a MaxMind-format geolocation
//!   database. It serves lock-minimal concurrent lookups from an immutable
//!   in-memory reader, refreshes the database from a remote URL in the
//!   background, picks up externally replaced files via a filesystem
//!   watch, and publishes lifecycle events on lossy notification streams.
//! - **[`RateLimiter`]**: per-caller admission control over a pluggable
//!   [`Backend`] counter - in-process map, Redis, or memcache - with a
//!   configurable fail-open/fail-closed policy for backend outages.
//!
//! # Serving lookups
//!
//! ```ignore
//! use ipgeo::{GeoDb, GeoRecord};
//! use std::time::Duration;
//!
//! let db = GeoDb::open_url(
//!     "https://example.com/GeoLite2-City.mmdb.gz",
//!     GeoDb::default_cache_file(),
//!     Duration::from_secs(24 * 3600), // update interval
//!     Duration::from_secs(3600),      // max retry interval
//! )?;
//!
//! let record: GeoRecord = db.lookup("8.8.8.8".parse()?)?;
//! println!("{}", record.country.iso_code);
//! ```
//!
//! Lookups return [`Error::Unavailable`] until the first database has
//! loaded; a front should map that to a "try again later" response.
//!
//! # Limiting callers
//!
//! ```ignore
//! use ipgeo::{MemoryBackend, Policy, RateLimiter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let rl = RateLimiter::new(Arc::new(MemoryBackend::default()), 10_000, Duration::from_secs(3600))
//!     .with_policy(Policy::Block);
//!
//! let decision = rl.admit(remote_addr)?;
//! if let Some(info) = &decision.info {
//!     for (name, value) in info.headers() {
//!         response.set_header(name, value);
//!     }
//! }
//! if !decision.allowed {
//!     return forbidden();
//! }
//! ```

mod error;
mod record;

pub mod db;
pub mod ratelimit;

pub use error::{Error, Result};
pub use record::{City, Continent, Country, GeoRecord, Location, Names, Postal, Subdivision};

pub use db::{DbEvents, GeoDb};

pub use ratelimit::{
    default_key, Backend, Decision, Hit, KeyMaker, MemcacheBackend, MemoryBackend, Policy,
    RateLimitInfo, RateLimiter, RedisBackend, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
};
