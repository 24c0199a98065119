//! Shared types for air-quality monitoring sites and readings.
//!
//! This crate holds the vocabulary used by the store, the sync engine
//! and the command-line tool: which series exist, how free-text site
//! metadata is normalized, and the shape of readings and outlier blocks.
//!
//! # Example
//!
//! ```
//! use airq_types::{Classification, Series, SiteStatus};
//!
//! assert_eq!(Series::Pm25.remote_code(), "IPM25");
//! assert_eq!(SiteStatus::from_remote("Coming Online"), SiteStatus::ComingOnline);
//! assert_eq!(Classification::from_remote("Urban Background"), Classification::UrbanBackground);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Classification, OutlierBlock, Reading, Series, SiteMetadata, SiteStatus, Source, TimeRange,
};
