//! Remote administrative-geography tier
//!
//! `RemoteResolver` walks the endpoint categories for a place kind and returns
//! the first record found, embedded parent units included.

mod client;
mod resolver;

pub use client::{
    parse_records, GeoCall, GeoClient, GeoError, HttpGeoClient, MockGeoClient, ParentRef,
    PlaceInfo, QueryParams,
};
pub use resolver::{GeoEndpoints, RemoteResolver};
