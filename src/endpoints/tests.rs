use poem_openapi::payload::Json;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    db::repositories::{
        memory::MemoryRepository,
        models::{order::OrderPaymentStatus, payment::PaymentStatus},
    },
    endpoints::{
        attach::{attach, AttachTransactionData, AttachTransactionResponse},
        create::{create, CreatePaymentData, CreatePaymentResponse},
        status::{status, PaymentStatusResponse},
        verify::{verify, VerifyTransactionData, VerifyTransactionResponse},
    },
    engine::{EngineSettings, PaymentEngine},
    ethereum::mock::MockChain,
};

const PLATFORM_WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
const BUYER_WALLET: &str = "0xABC0000000000000000000000000000000000001";
const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

type TestEngine = PaymentEngine<MemoryRepository, MockChain>;

fn engine_with(platform_wallet: Option<&str>) -> (TestEngine, MemoryRepository, MockChain) {
    let repository = MemoryRepository::new();
    let chain = MockChain::default();
    let settings = EngineSettings {
        platform_wallet: platform_wallet.map(str::to_string),
        ..EngineSettings::default()
    };

    (
        PaymentEngine::new(repository.clone(), chain.clone(), settings),
        repository,
        chain,
    )
}

fn create_data(order_id: i64) -> CreatePaymentData {
    CreatePaymentData {
        order_id,
        wallet_address_from: BUYER_WALLET.to_string(),
    }
}

async fn created(engine: &TestEngine, order_id: i64) -> Uuid {
    match create(engine, &create_data(order_id)).await {
        CreatePaymentResponse::Created(Json(body)) => body.id,
        _ => panic!("payment was not created"),
    }
}

#[tokio::test]
async fn create_returns_the_payment_instructions() {
    let (engine, repository, _) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(7, Decimal::new(15000, 2)).await;

    let CreatePaymentResponse::Created(Json(body)) = create(&engine, &create_data(7)).await
    else {
        panic!("expected 201");
    };

    assert_eq!(body.amount, "150.00");
    assert_eq!(body.currency, "USDT");
    assert_eq!(body.wallet_address_to, PLATFORM_WALLET);
    assert_eq!(body.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn create_maps_errors_to_status_codes() {
    let (engine, repository, _) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(1, Decimal::new(100, 0)).await;

    let bad_wallet = CreatePaymentData {
        order_id: 1,
        wallet_address_from: "0x123".to_string(),
    };
    assert!(matches!(
        create(&engine, &bad_wallet).await,
        CreatePaymentResponse::BadRequest(_)
    ));
    assert!(matches!(
        create(&engine, &create_data(404)).await,
        CreatePaymentResponse::NotFound(_)
    ));

    created(&engine, 1).await;
    assert!(matches!(
        create(&engine, &create_data(1)).await,
        CreatePaymentResponse::Conflict(_)
    ));

    let mut paid = repository.insert_order(2, Decimal::new(100, 0)).await;
    paid.payment_status = OrderPaymentStatus::Completed;
    repository.put_order(paid).await;
    assert!(matches!(
        create(&engine, &create_data(2)).await,
        CreatePaymentResponse::BadRequest(_)
    ));
}

#[tokio::test]
async fn create_without_a_platform_wallet_is_a_server_error() {
    let (engine, repository, _) = engine_with(None);
    repository.insert_order(1, Decimal::new(100, 0)).await;

    let CreatePaymentResponse::InternalServerError(Json(body)) =
        create(&engine, &create_data(1)).await
    else {
        panic!("expected 500");
    };
    assert_eq!(body.message, "Internal server error");
    assert_eq!(repository.payment_count().await, 0);
}

#[tokio::test]
async fn attach_then_status_reports_the_hash() {
    let (engine, repository, _) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(1, Decimal::new(100, 0)).await;
    let id = created(&engine, 1).await;

    let data = AttachTransactionData {
        transaction_hash: HASH.to_uppercase().replacen("0X", "0x", 1),
    };
    let AttachTransactionResponse::Ok(Json(body)) = attach(&engine, &id, &data).await else {
        panic!("expected 200");
    };
    assert_eq!(body.status, PaymentStatus::Pending);

    let PaymentStatusResponse::Ok(Json(body)) = status(&engine, &id).await else {
        panic!("expected 200");
    };
    assert_eq!(body.id, id);
    assert_eq!(body.transaction_hash.as_deref(), Some(HASH));
    assert_eq!(body.confirmation_count, 0);
    assert_eq!(body.amount, "100");
}

#[tokio::test]
async fn attach_maps_errors_to_status_codes() {
    let (engine, repository, _) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(1, Decimal::new(100, 0)).await;
    repository.insert_order(2, Decimal::new(100, 0)).await;
    let first = created(&engine, 1).await;
    let second = created(&engine, 2).await;

    let bad = AttachTransactionData {
        transaction_hash: "0xnothex".to_string(),
    };
    assert!(matches!(
        attach(&engine, &first, &bad).await,
        AttachTransactionResponse::BadRequest(_)
    ));

    let good = AttachTransactionData {
        transaction_hash: HASH.to_string(),
    };
    assert!(matches!(
        attach(&engine, &Uuid::new_v4(), &good).await,
        AttachTransactionResponse::NotFound(_)
    ));
    assert!(matches!(
        attach(&engine, &first, &good).await,
        AttachTransactionResponse::Ok(_)
    ));
    assert!(matches!(
        attach(&engine, &second, &good).await,
        AttachTransactionResponse::Conflict(_)
    ));
}

#[tokio::test]
async fn status_of_an_unknown_payment_is_not_found() {
    let (engine, _, _) = engine_with(Some(PLATFORM_WALLET));

    assert!(matches!(
        status(&engine, &Uuid::new_v4()).await,
        PaymentStatusResponse::NotFound(_)
    ));
}

#[tokio::test]
async fn verify_reports_progress_then_confirmation() {
    let (engine, repository, chain) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(1, Decimal::new(100, 0)).await;
    let id = created(&engine, 1).await;
    let data = AttachTransactionData {
        transaction_hash: HASH.to_string(),
    };
    attach(&engine, &id, &data).await;

    chain.mine(HASH, true, 100);
    chain.set_current_block(105);
    let request = VerifyTransactionData {
        transaction_hash: HASH.to_string(),
        block_number: None,
    };

    let VerifyTransactionResponse::Ok(Json(body)) = verify(&engine, &request).await else {
        panic!("expected 200");
    };
    assert_eq!(body.confirmations, 5);
    assert_eq!(body.required, 12);
    assert_eq!(body.status, PaymentStatus::Pending);
    assert_eq!(body.message, "Waiting for confirmations (5/12)");

    chain.set_current_block(112);
    let VerifyTransactionResponse::Ok(Json(body)) = verify(&engine, &request).await else {
        panic!("expected 200");
    };
    assert_eq!(body.status, PaymentStatus::Confirmed);
    assert_eq!(body.message, "Payment confirmed");
}

#[tokio::test]
async fn verify_maps_errors_to_status_codes() {
    let (engine, repository, chain) = engine_with(Some(PLATFORM_WALLET));
    repository.insert_order(1, Decimal::new(100, 0)).await;
    let id = created(&engine, 1).await;

    let request = VerifyTransactionData {
        transaction_hash: HASH.to_string(),
        block_number: Some(100),
    };
    assert!(matches!(
        verify(&engine, &request).await,
        VerifyTransactionResponse::NotFound(_)
    ));

    let data = AttachTransactionData {
        transaction_hash: HASH.to_string(),
    };
    attach(&engine, &id, &data).await;

    // Not mined yet.
    chain.set_current_block(100);
    assert!(matches!(
        verify(&engine, &request).await,
        VerifyTransactionResponse::BadRequest(_)
    ));

    chain.set_unavailable(true);
    assert!(matches!(
        verify(&engine, &request).await,
        VerifyTransactionResponse::InternalServerError(_)
    ));

    chain.set_unavailable(false);
    chain.mine(HASH, false, 100);
    assert!(matches!(
        verify(&engine, &request).await,
        VerifyTransactionResponse::BadRequest(_)
    ));
    assert_eq!(
        repository.payment(&id).await.unwrap().status,
        PaymentStatus::Failed
    );
}
