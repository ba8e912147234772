pub mod attach;
pub mod create;
pub mod status;
pub mod verify;

#[cfg(test)]
mod tests;

use poem_openapi::payload::Json;
use tracing::error;

use crate::{engine::PaymentError, responses::error::ErrorResponse};

fn message(e: &PaymentError) -> Json<ErrorResponse> {
    Json(e.to_string().into())
}

/// Logs the cause and hides it from the caller.
fn internal(context: &str, e: &PaymentError) -> Json<ErrorResponse> {
    error!("{}: {}", context, e);
    Json("Internal server error".into())
}
