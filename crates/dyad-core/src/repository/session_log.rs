//! Session log trait definition.

use std::path::PathBuf;

use dyad_types::dialogue::SessionLogRecord;
use dyad_types::error::SessionError;

/// Sink for finished sessions. One record per session.
pub trait SessionLog: Send + Sync {
    /// Persist a record and return where it was written.
    ///
    /// Names must be unique across a batch run even when the same
    /// character/situation pair runs more than once.
    fn write(
        &self,
        record: &SessionLogRecord,
    ) -> impl std::future::Future<Output = Result<PathBuf, SessionError>> + Send;
}
