//! Shared Diesel error mapping for the warehouse repositories.

use tracing::debug;

/// Identifiers bound per `IN (...)` query, well under SQLite's parameter limit.
pub(crate) const ID_CHUNK: usize = 500;

/// Map a Diesel error into a repository-specific error.
///
/// Closed connections map through `connection`; everything else maps through
/// `query`. The Diesel message is kept since there is no client to hide it
/// from.
pub(crate) fn map_diesel_error<E, Q, C>(
    error: diesel::result::Error,
    operation: &str,
    query: Q,
    connection: C,
) -> E
where
    Q: FnOnce(String) -> E,
    C: FnOnce(String) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        _ => debug!(%error, %operation, "diesel operation failed"),
    }

    let message = format!("{operation}: {error}");
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
        | DieselError::BrokenTransactionManager => connection(message),
        _ => query(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::Error as DieselError;
    use rstest::rstest;

    #[derive(Debug, PartialEq, Eq)]
    enum Probe {
        Query(String),
        Connection(String),
    }

    #[rstest]
    #[case::not_found(DieselError::NotFound, false)]
    #[case::rolled_back(DieselError::RollbackTransaction, false)]
    #[case::broken(DieselError::BrokenTransactionManager, true)]
    fn routes_errors_by_kind(#[case] error: DieselError, #[case] is_connection: bool) {
        let mapped = map_diesel_error(error, "probe", Probe::Query, Probe::Connection);
        assert_eq!(matches!(mapped, Probe::Connection(_)), is_connection);
        let (Probe::Query(message) | Probe::Connection(message)) = mapped;
        assert!(message.starts_with("probe: "), "{message}");
    }
}
