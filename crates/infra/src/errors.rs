//! Conversions from external infrastructure errors into domain errors.

use jobfeed_domain::JobFeedError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub JobFeedError);

impl From<InfraError> for JobFeedError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<JobFeedError> for InfraError {
    fn from(value: JobFeedError) -> Self {
        InfraError(value)
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let err = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => JobFeedError::Database("database is busy".into()),
                    ErrorCode::DatabaseLocked => {
                        JobFeedError::Database("database is locked".into())
                    }
                    ErrorCode::ConstraintViolation => JobFeedError::Database(format!(
                        "constraint violation (code {}): {message}",
                        err.extended_code
                    )),
                    _ => JobFeedError::Database(format!(
                        "sqlite failure {:?} (code {}): {message}",
                        err.code, err.extended_code
                    )),
                }
            }
            RE::QueryReturnedNoRows => JobFeedError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                JobFeedError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                JobFeedError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidQuery => JobFeedError::Database("invalid SQL query".into()),
            other => JobFeedError::Database(other.to_string()),
        };
        InfraError(err)
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(JobFeedError::Database(format!("connection pool error: {value}")))
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        let err = if value.is_timeout() {
            JobFeedError::Network(format!("request timed out: {value}"))
        } else if value.is_connect() {
            JobFeedError::Network(format!("connection failed: {value}"))
        } else if value.is_decode() {
            JobFeedError::Serialization(format!("response decode failed: {value}"))
        } else {
            JobFeedError::Network(value.to_string())
        };
        InfraError(err)
    }
}

/// Map a blocking-task join failure into the domain error space.
pub fn map_join_error(err: tokio::task::JoinError) -> JobFeedError {
    if err.is_cancelled() {
        JobFeedError::Internal("blocking task cancelled".into())
    } else {
        JobFeedError::Internal(format!("blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rows_maps_to_not_found() {
        let infra: InfraError = SqlError::QueryReturnedNoRows.into();
        assert!(matches!(JobFeedError::from(infra), JobFeedError::NotFound(_)));
    }

    #[test]
    fn invalid_query_maps_to_database() {
        let infra: InfraError = SqlError::InvalidQuery.into();
        assert!(matches!(JobFeedError::from(infra), JobFeedError::Database(_)));
    }
}
