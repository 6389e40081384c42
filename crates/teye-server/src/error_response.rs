use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use teye_observability::REQUESTS_BY_CODE;
use teye_types::TeyeError;

/// Wraps `TeyeError` so it can implement `IntoResponse` here without an
/// orphan-rule violation (the error type lives in `teye-types`, which has no
/// axum dependency of its own).
pub struct ApiError(pub TeyeError);

impl From<TeyeError> for ApiError {
    fn from(err: TeyeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        REQUESTS_BY_CODE.with_label_values(&[self.0.code()]).inc();
        (status, Json(self.0.to_response_body())).into_response()
    }
}
