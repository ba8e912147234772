use poem_openapi::{payload::Json, ApiResponse, Object};
use uuid::Uuid;

use crate::{
    db::{repositories::models::payment::PaymentStatus, PaymentRepository},
    endpoints::{internal, message},
    engine::{ErrorKind, PaymentEngine},
    ethereum::ChainClient,
    responses::error::ErrorResponse,
};

#[derive(Debug, Object, Clone, Eq, PartialEq)]
#[oai(rename_all = "camelCase")]
pub struct AttachTransactionData {
    pub transaction_hash: String,
}

#[derive(Debug, Object, Clone, Eq, PartialEq)]
pub struct AttachTransactionResponseObject {
    pub status: PaymentStatus,
    pub message: String,
}

#[derive(ApiResponse)]
pub enum AttachTransactionResponse {
    #[oai(status = 200)]
    Ok(Json<AttachTransactionResponseObject>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),

    #[oai(status = 409)]
    Conflict(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),
}

/// Answers as soon as the hash is stored; the monitor confirms it later.
pub async fn attach<R, C>(
    engine: &PaymentEngine<R, C>,
    payment_id: &Uuid,
    data: &AttachTransactionData,
) -> AttachTransactionResponse
where
    R: PaymentRepository,
    C: ChainClient,
{
    let payment = engine
        .attach_transaction_hash(payment_id, &data.transaction_hash)
        .await;

    match payment {
        Ok(payment) => AttachTransactionResponse::Ok(Json(AttachTransactionResponseObject {
            status: payment.status,
            message: "Transaction submitted, waiting for confirmations".to_string(),
        })),
        Err(e) => match e.kind() {
            ErrorKind::Validation => AttachTransactionResponse::BadRequest(message(&e)),
            ErrorKind::NotFound => AttachTransactionResponse::NotFound(message(&e)),
            ErrorKind::Conflict => AttachTransactionResponse::Conflict(message(&e)),
            ErrorKind::Configuration | ErrorKind::ChainUnavailable | ErrorKind::Internal => {
                AttachTransactionResponse::InternalServerError(internal(
                    "Failed to attach transaction",
                    &e,
                ))
            }
        },
    }
}
