pub mod config;
pub mod model;
pub mod tuning;

pub use config::{AppConfig, ConfigIntervals, UpstreamConfig};
pub use model::{AccessMode, ActivitySignal, NowPlayingFacet, TrackIdentity, TrackSnapshot};
pub use tuning::Tuning;
