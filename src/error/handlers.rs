//! Error handlers
//!
//! Maps errors onto wire-level status codes and process exit codes.

use crate::error::types::{ConfinementError, ListenerError, UploadError};
use crate::http::Status;

/// Exit code of a listener process stopped by its supervisor.
pub const EXIT_CLEAN: i32 = 0;
/// Exit code of the supervisor when at least one listener failed.
pub const EXIT_LISTENER_FAILED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_BIND_FAILURE: i32 = 3;
pub const EXIT_ENGINE_FAILURE: i32 = 4;

/// Convert a path resolution error to an HTTP status
pub fn confinement_to_http_status(err: &ConfinementError) -> Status {
    match err {
        ConfinementError::Escape(_) => Status::Forbidden,
        ConfinementError::InvalidPath(_) => Status::BadRequest,
        ConfinementError::NotADirectory(_) => Status::NotFound,
        ConfinementError::ReadOnly(_) => Status::Forbidden,
        ConfinementError::IoError(_) => Status::InternalServerError,
    }
}

/// Convert an upload error to an HTTP status
pub fn upload_to_http_status(err: &UploadError) -> Status {
    match err {
        UploadError::TargetIsDirectory(_) => Status::MethodNotAllowed,
        UploadError::ParentMissing(_) => Status::NotFound,
        UploadError::LengthRequired => Status::LengthRequired,
        UploadError::BadLength(_) => Status::BadRequest,
        UploadError::Truncated { .. } => Status::BadRequest,
        UploadError::TimedOut => Status::RequestTimeout,
        UploadError::Confinement(e) => confinement_to_http_status(e),
        UploadError::IoError(_) => Status::InternalServerError,
    }
}

/// Convert a listener error to the exit code of its process
pub fn listener_exit_code(err: &ListenerError) -> i32 {
    match err {
        ListenerError::Bind { .. } => EXIT_BIND_FAILURE,
        ListenerError::Root(_) => EXIT_CONFIG,
        ListenerError::Engine { .. } | ListenerError::IoError(_) => EXIT_ENGINE_FAILURE,
    }
}

/// Failure kind reported by a listener process exit code
pub fn exit_code_kind(code: Option<i32>) -> &'static str {
    match code {
        Some(EXIT_BIND_FAILURE) => "BindFailure",
        Some(EXIT_CONFIG) => "InvalidRoot",
        Some(EXIT_ENGINE_FAILURE) => "EngineFailure",
        Some(_) => "AbnormalExit",
        None => "KilledBySignal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_map_to_documented_statuses() {
        assert_eq!(
            upload_to_http_status(&UploadError::TargetIsDirectory("/".into())).code(),
            405
        );
        assert_eq!(
            upload_to_http_status(&UploadError::ParentMissing("/x".into())).code(),
            404
        );
        assert_eq!(upload_to_http_status(&UploadError::LengthRequired).code(), 411);
        assert_eq!(
            upload_to_http_status(&UploadError::Confinement(ConfinementError::Escape(
                "/../x".into()
            )))
            .code(),
            403
        );
    }

    #[test]
    fn exit_codes_round_trip_to_kinds() {
        assert_eq!(exit_code_kind(Some(EXIT_BIND_FAILURE)), "BindFailure");
        assert_eq!(exit_code_kind(None), "KilledBySignal");
        assert_eq!(exit_code_kind(Some(42)), "AbnormalExit");
    }
}
