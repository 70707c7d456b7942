//! Interpolation engine over published forecast snapshots.
//!
//! Decoded [`GridSnapshot`](wx_common::GridSnapshot)s are published into a
//! [`SnapshotStore`], which keeps the newest cycles of each product. The
//! [`InterpolationEngine`] answers point queries against the store:
//!
//! ```text
//! resolve(point, altitude or pressure, time)
//!      │
//!      ├─► Bracket the time between forecast hours of the primary product
//!      │
//!      ├─► For each bracketing snapshot (via the column cache):
//!      │         bilinear in lat/lon, wrapping longitude and
//!      │         mirroring across the poles
//!      │
//!      ├─► Blend the two columns linearly in time
//!      │
//!      ├─► Attach eddy dissipation from the turbulence product
//!      │
//!      └─► Sample the target in ln(p), detect the tropopause
//!               │
//!               ▼
//!          InterpolatedPoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{InterpolationConfig, InterpolationEngine, SnapshotStore, VerticalTarget};
//!
//! let config = InterpolationConfig::from_env();
//! let store = Arc::new(SnapshotStore::new(&config));
//! store.publish(snapshot)?;
//!
//! let engine = InterpolationEngine::new(store, config)?;
//! let point = engine.resolve(&GeoPoint::new(47.46, 8.55), VerticalTarget::Altitude(3000.0), now)?;
//! println!("{:?}", point.target.wind());
//! ```

pub mod cache;
pub mod column;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpolation;
pub mod store;
pub mod tropopause;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::{ColumnCache, ColumnKey};
pub use column::Column;
pub use config::InterpolationConfig;
pub use engine::InterpolationEngine;
pub use error::{GridProcessorError, Result};
pub use store::{PublishOutcome, SnapshotStore, StoreState};
pub use tropopause::{find_tropopause, resolve_tropopause};
pub use types::{
    CacheStats, InterpolatedPoint, LevelSample, SurfaceSample, Tropopause, TropopauseSource,
    VerticalTarget,
};
