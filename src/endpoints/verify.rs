use poem_openapi::{payload::Json, ApiResponse, Object};

use crate::{
    db::{repositories::models::payment::PaymentStatus, PaymentRepository},
    endpoints::{internal, message},
    engine::{ErrorKind, PaymentEngine},
    ethereum::ChainClient,
    responses::error::ErrorResponse,
};

#[derive(Debug, Object, Clone, Eq, PartialEq)]
#[oai(rename_all = "camelCase")]
pub struct VerifyTransactionData {
    pub transaction_hash: String,
    /// Block the caller saw the transaction in. Defaults to the receipt's block.
    pub block_number: Option<u64>,
}

#[derive(Debug, Object, Clone, Eq, PartialEq)]
pub struct VerifyTransactionResponseObject {
    pub message: String,
    pub confirmations: u64,
    pub required: u64,
    pub status: PaymentStatus,
}

#[derive(ApiResponse)]
pub enum VerifyTransactionResponse {
    #[oai(status = 200)]
    Ok(Json<VerifyTransactionResponseObject>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),
}

pub async fn verify<R, C>(
    engine: &PaymentEngine<R, C>,
    data: &VerifyTransactionData,
) -> VerifyTransactionResponse
where
    R: PaymentRepository,
    C: ChainClient,
{
    let result = engine
        .verify_by_hash(&data.transaction_hash, data.block_number)
        .await;

    match result {
        Ok(result) => {
            let message = if result.is_confirmed() {
                "Payment confirmed".to_string()
            } else {
                format!(
                    "Waiting for confirmations ({}/{})",
                    result.confirmations, result.required
                )
            };

            VerifyTransactionResponse::Ok(Json(VerifyTransactionResponseObject {
                message,
                confirmations: result.confirmations,
                required: result.required,
                status: result.status,
            }))
        }
        Err(e) => match e.kind() {
            ErrorKind::Validation => VerifyTransactionResponse::BadRequest(message(&e)),
            ErrorKind::NotFound => VerifyTransactionResponse::NotFound(message(&e)),
            ErrorKind::ChainUnavailable => VerifyTransactionResponse::InternalServerError(
                internal("Ethereum node unavailable during verification", &e),
            ),
            ErrorKind::Conflict | ErrorKind::Configuration | ErrorKind::Internal => {
                VerifyTransactionResponse::InternalServerError(internal(
                    "Failed to verify transaction",
                    &e,
                ))
            }
        },
    }
}
