//! Driven ports at the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod analytic_store;
mod credential_store;
mod detail_archive;
mod detail_repository;
mod shard_store;
mod strava_api;
mod table_directory;

#[cfg(test)]
pub use analytic_store::MockAnalyticStore;
pub use analytic_store::{
    AnalyticStore, AnalyticStoreError, CandidateActivity, CanonicalPublication, CanonicalRow,
};
#[cfg(test)]
pub use credential_store::MockCredentialStore;
pub use credential_store::{CredentialStore, CredentialStoreError, StoredCredential};
#[cfg(test)]
pub use detail_archive::MockDetailArchive;
pub use detail_archive::{ArchivedPayload, DetailArchive, DetailArchiveError};
#[cfg(test)]
pub use detail_repository::MockDetailRepository;
pub use detail_repository::{DetailRepository, DetailRepositoryError};
#[cfg(test)]
pub use shard_store::MockShardStore;
pub use shard_store::{Shard, ShardStore, ShardStoreError};
#[cfg(test)]
pub use strava_api::MockStravaApi;
pub use strava_api::{
    ActivityPageQuery, ApiResponse, ClientCredentials, StravaApi, StravaApiError, TokenGrant,
};
#[cfg(test)]
pub use table_directory::MockTableDirectory;
pub use table_directory::{TableDirectory, TableDirectoryError};
