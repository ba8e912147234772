use poem_openapi::{payload::Json, ApiResponse, Object};
use uuid::Uuid;

use crate::{
    db::{repositories::models::payment::PaymentStatus, PaymentRepository},
    endpoints::internal,
    engine::{ErrorKind, PaymentEngine},
    ethereum::ChainClient,
    responses::error::ErrorResponse,
};

#[derive(Debug, Object, Clone, Eq, PartialEq)]
#[oai(rename_all = "camelCase")]
pub struct PaymentStatusObject {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub transaction_hash: Option<String>,
    pub confirmation_count: i64,
    pub amount: String,
    pub currency: String,
}

#[derive(ApiResponse)]
pub enum PaymentStatusResponse {
    #[oai(status = 200)]
    Ok(Json<PaymentStatusObject>),

    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),
}

pub async fn status<R, C>(engine: &PaymentEngine<R, C>, payment_id: &Uuid) -> PaymentStatusResponse
where
    R: PaymentRepository,
    C: ChainClient,
{
    match engine.get_status(payment_id).await {
        Ok(view) => PaymentStatusResponse::Ok(Json(PaymentStatusObject {
            id: view.id,
            status: view.status,
            transaction_hash: view.transaction_hash,
            confirmation_count: view.confirmation_count,
            amount: view.amount.to_string(),
            currency: view.currency,
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            PaymentStatusResponse::NotFound(Json("Not found".into()))
        }
        Err(e) => {
            PaymentStatusResponse::InternalServerError(internal("Error getting payment", &e))
        }
    }
}
