//! Strava REST API adapter.

mod dto;
mod http_client;

pub use http_client::StravaHttpClient;
