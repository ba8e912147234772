use std::{sync::Arc, time::Duration};

use color_eyre::eyre::WrapErr;
use config::Config;
use db::Repository;
use endpoints::{
    attach::{AttachTransactionData, AttachTransactionResponse},
    create::{CreatePaymentData, CreatePaymentResponse},
    status::PaymentStatusResponse,
    verify::{VerifyTransactionData, VerifyTransactionResponse},
};
use engine::{monitor, PaymentEngine};
use ethereum::{ChainClient, EthereumRpcClient};
use poem::{listener::TcpListener, middleware::Cors, web::Data, EndpointExt, Route, Server};
use poem_openapi::{param::Path, payload::Json, OpenApi, OpenApiService};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub mod config;
pub mod db;
pub mod endpoints;
pub mod engine;
pub mod ethereum;
pub mod responses;
pub mod utils;

type Engine = PaymentEngine<Repository, EthereumRpcClient>;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct Api;

#[OpenApi]
impl Api {
    /// Create a pending crypto payment for an order.
    #[oai(path = "/payments/crypto", method = "post")]
    async fn create(
        &self,
        engine: Data<&Arc<Engine>>,
        data: Json<CreatePaymentData>,
    ) -> CreatePaymentResponse {
        endpoints::create::create(engine.0.as_ref(), &data).await
    }

    /// Attach the buyer's transaction hash and start monitoring it.
    #[oai(path = "/payments/crypto/:payment_id", method = "put")]
    async fn attach(
        &self,
        engine: Data<&Arc<Engine>>,
        payment_id: Path<Uuid>,
        data: Json<AttachTransactionData>,
    ) -> AttachTransactionResponse {
        endpoints::attach::attach(engine.0.as_ref(), &payment_id, &data).await
    }

    #[oai(path = "/payments/crypto/:payment_id", method = "get")]
    async fn status(
        &self,
        engine: Data<&Arc<Engine>>,
        payment_id: Path<Uuid>,
    ) -> PaymentStatusResponse {
        endpoints::status::status(engine.0.as_ref(), &payment_id).await
    }

    /// Check a transaction against the chain right away.
    #[oai(path = "/payments/crypto/verify", method = "post")]
    async fn verify(
        &self,
        engine: Data<&Arc<Engine>>,
        data: Json<VerifyTransactionData>,
    ) -> VerifyTransactionResponse {
        endpoints::verify::verify(engine.0.as_ref(), &data).await
    }
}

async fn check_network(rpc: &EthereumRpcClient, config: &Config) {
    match rpc.get_chain_id().await {
        Ok(id) if id == config.chain.chain_id() => {
            info!("[RPC] Connected to {} (chain id {})", config.chain, id)
        }
        Ok(id) => warn!(
            "[RPC] Node reports chain id {}, expected {} for {}",
            id,
            config.chain.chain_id(),
            config.chain
        ),
        Err(e) => error!("[RPC] Could not read chain id: {}", e),
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().wrap_err("Invalid configuration")?;
    config.log_summary();

    let repository = Repository::connect(&config.database_url, config.db_max_connections)
        .await
        .wrap_err("Failed to connect to the database")?;
    repository
        .migrate()
        .await
        .wrap_err("Failed to run migrations")?;

    let rpc = EthereumRpcClient::new(&config.ethereum_provider_url, config.rpc_retry)?;
    check_network(&rpc, &config).await;

    let engine = Arc::new(Engine::new(repository, rpc, config.engine.clone()));
    let monitor = monitor::spawn(engine.clone());

    let mut api_service = OpenApiService::new(Api, "Crypto Payments API", "v0.0.1")
        .server(format!("http://{}", config.bind_address));
    if let Some(public_url) = &config.public_url {
        api_service = api_service.server(public_url.clone());
    }
    let open_api = api_service.swagger_ui();

    let routes = Route::new()
        .nest("/", api_service)
        .nest("/swagger", open_api)
        .with(Cors::new().allow_origins(config.cors_origins.clone()))
        .data(engine);

    let served = Server::new(TcpListener::bind(config.bind_address.clone()))
        .run_with_graceful_shutdown(
            routes,
            async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            },
            Some(SHUTDOWN_TIMEOUT),
        )
        .await;

    monitor.shutdown().await;
    served?;

    Ok(())
}
