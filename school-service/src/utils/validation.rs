use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::dtos::ErrorResponse;

/// JSON body that passed its `validator` rules. Malformed bodies are 400,
/// rule violations 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(reject_body)?;

        value.validate().map_err(reject_fields)?;
        Ok(ValidatedJson(value))
    }
}

fn reject_body(rejection: JsonRejection) -> Response {
    let error = ErrorResponse {
        error: format!("Invalid request body: {}", rejection.body_text()),
    };
    (StatusCode::BAD_REQUEST, Json(error)).into_response()
}

fn reject_fields(errors: ValidationErrors) -> Response {
    let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
    fields.sort_unstable();
    let error = ErrorResponse {
        error: format!("Invalid value for: {}", fields.join(", ")),
    };
    (StatusCode::UNPROCESSABLE_ENTITY, Json(error)).into_response()
}
