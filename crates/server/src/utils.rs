use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::ErrorResponse;
use crate::sync::SyncError;

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

/// Unwraps a JSON request body; a malformed body is a 400 with a JSON error.
pub fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, (StatusCode, Json<ErrorResponse>)> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(json_error(
            StatusCode::BAD_REQUEST,
            format!("invalid argument: {}", rejection.body_text()),
        )),
    }
}

pub fn sync_error_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SyncError::Conflict(_) => StatusCode::CONFLICT,
        SyncError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn sync_error(err: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    json_error(sync_error_status(&err), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_statuses() {
        let cases = [
            (SyncError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (SyncError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (SyncError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                SyncError::UpstreamUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(sync_error_status(&err), status);
        }
        let (status, Json(body)) = sync_error(SyncError::Conflict("stale".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "conflict: stale");
    }
}
