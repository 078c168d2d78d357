//! Explains the change of an aggregate metric between a baseline and a
//! current time window by ranking the dimension-value slices of an OLAP cube.

pub mod config;
pub mod cost;
pub mod cube;
pub mod dimensions;
pub mod error;
pub mod gateway;
pub mod service;
pub mod summary;

pub use config::SummaryConfig;
pub use cube::{Assignment, Cube, CubeBuilder, Slice, SliceId};
pub use dimensions::{DimensionSet, Hierarchy};
pub use error::{GatewayError, SummaryError, SummaryResult};
pub use gateway::{
    AggregateGateway, AggregateQuery, GroupedValues, InMemoryGateway, TimeRange, TimeRangeKind,
};
pub use service::{
    build_auto_ordered_summary, build_manual_ordered_summary, AutoSummaryRequest,
    ManualSummaryRequest, SummaryContext,
};
pub use summary::{Summary, SummaryEntry, SummaryResponse};
