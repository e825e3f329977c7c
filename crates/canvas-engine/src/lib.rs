//! Analysis adapters for the decision canvas
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │        AdapterResolver       │  probe once, memoize
//!   └──────┬────────────────┬──────┘
//!          │                │
//!   ┌──────▼──────┐  ┌──────▼──────┐
//!   │ HttpAdapter │  │ MockAdapter │
//!   │  HTTP + SSE │  │ seeded PRNG │
//!   └──────┬──────┘  └──────┬──────┘
//!          │                │
//!          └─────► RunStream ◄──── CancelHandle
//! ```
//!
//! Both adapters implement [`AnalysisAdapter`]; streaming runs hand back a
//! [`RunStream`] whose cancellation is cooperative and idempotent.

#![warn(unreachable_pub)]

pub mod adapter;
pub mod cache;
pub mod error;
pub mod http;
pub mod mock;
pub mod prng;
pub mod resolver;
pub mod stream;

pub use adapter::{AdapterMode, AnalysisAdapter, HealthStatus};
pub use cache::{CacheEntry, CacheStats, ReadCache};
pub use error::EngineError;
pub use http::HttpAdapter;
pub use mock::{MockAdapter, MockConfig};
pub use prng::Mulberry32;
pub use resolver::{
    AdapterConfig, AdapterPreference, AdapterResolver, AdapterSource, FixedAdapter, ProbeStatus,
};
pub use stream::{CancelHandle, EventSender, RunStream};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::adapter::{AdapterMode, AnalysisAdapter};
    pub use crate::mock::{MockAdapter, MockConfig};
    pub use crate::resolver::{AdapterResolver, AdapterSource, FixedAdapter};
    pub use crate::stream::{CancelHandle, RunStream};
}
