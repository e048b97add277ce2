use snafu::Snafu;

use crate::request::RequestError;
use crate::storage::StorageError;

/// An enumeration representing various authentication-related errors.
#[derive(Debug, Snafu)]
pub enum BetterAuthError {
    #[snafu(display("BetterAuthError: Request error"))]
    Request { source: RequestError },

    #[snafu(display("BetterAuthError: Storage error"))]
    Storage { source: StorageError },
}
