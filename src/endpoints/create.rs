use poem_openapi::{payload::Json, ApiResponse, Object};
use uuid::Uuid;

use crate::{
    db::{repositories::models::payment::PaymentStatus, PaymentRepository},
    endpoints::{internal, message},
    engine::{ErrorKind, PaymentEngine, PaymentError},
    ethereum::ChainClient,
    responses::error::ErrorResponse,
};

#[derive(Debug, Object, Clone, Eq, PartialEq)]
#[oai(rename_all = "camelCase")]
pub struct CreatePaymentData {
    pub order_id: i64,
    pub wallet_address_from: String,
}

#[derive(Debug, Object, Clone, Eq, PartialEq)]
#[oai(rename_all = "camelCase")]
pub struct CreatePaymentResponseObject {
    pub id: Uuid,
    /// Decimal amount, serialized as a string.
    pub amount: String,
    pub currency: String,
    pub wallet_address_to: String,
    pub status: PaymentStatus,
}

#[derive(ApiResponse)]
pub enum CreatePaymentResponse {
    #[oai(status = 201)]
    Created(Json<CreatePaymentResponseObject>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),

    #[oai(status = 409)]
    Conflict(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),
}

pub async fn create<R, C>(
    engine: &PaymentEngine<R, C>,
    data: &CreatePaymentData,
) -> CreatePaymentResponse
where
    R: PaymentRepository,
    C: ChainClient,
{
    let payment = engine
        .create_payment(data.order_id, data.wallet_address_from.trim())
        .await;

    match payment {
        Ok(payment) => CreatePaymentResponse::Created(Json(CreatePaymentResponseObject {
            id: payment.id,
            amount: payment.amount.to_string(),
            currency: payment.currency,
            wallet_address_to: payment.wallet_address_to,
            status: payment.status,
        })),
        Err(e @ PaymentError::OrderAlreadyPaid(_)) => {
            CreatePaymentResponse::BadRequest(message(&e))
        }
        Err(e) => match e.kind() {
            ErrorKind::Validation => CreatePaymentResponse::BadRequest(message(&e)),
            ErrorKind::NotFound => CreatePaymentResponse::NotFound(message(&e)),
            ErrorKind::Conflict => CreatePaymentResponse::Conflict(message(&e)),
            ErrorKind::Configuration | ErrorKind::ChainUnavailable | ErrorKind::Internal => {
                CreatePaymentResponse::InternalServerError(internal("Failed to create payment", &e))
            }
        },
    }
}
