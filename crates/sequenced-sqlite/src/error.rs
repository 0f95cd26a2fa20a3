use core::time::Duration;
use rusqlite::{ErrorCode, ffi};
use sequenced::Error;

/// Translates a SQLite failure into the sequencing error taxonomy.
///
/// `resource` names what was being locked or written, for the error message.
pub(crate) fn map_error(err: rusqlite::Error, resource: &str, waited: Duration) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Error::LockTimeout {
                resource: resource.to_owned(),
                waited,
            },
            ErrorCode::ConstraintViolation
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Error::DuplicateSequenceValue {
                    table: resource.to_owned(),
                    constraint: message.clone().unwrap_or_else(|| failure.to_string()),
                }
            }
            _ => Error::Store(err.to_string()),
        },
        _ => Error::Store(err.to_string()),
    }
}
