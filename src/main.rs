use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

use credential_authority::config::{Config, StoreBackend};
use credential_authority::credentials::{
    CredentialHasher, CredentialRepository, CredentialStore, InMemoryCredentialRepository,
    PgCredentialRepository,
};
use credential_authority::grpc::AuthServiceImpl;
use credential_authority::keys::KeyMaterialProvider;
use credential_authority::observability::{init_tracing, TracingConfig};
use credential_authority::shutdown::{run_with_graceful_shutdown, wait_for_signal, Shutdown};
use credential_authority::AuthorityFacade;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&TracingConfig::from(&config));

    info!(environment = ?config.environment, "Starting credential authority");

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_addr()))?;

    // Missing key material is provisioned here; failure is fatal.
    let keys = Arc::new(KeyMaterialProvider::new(
        config.key_dir.clone(),
        config.key_namespace.clone(),
    )?);
    let loader = Arc::clone(&keys);
    let namespace = config.key_namespace.clone();
    let signing = tokio::task::spawn_blocking(move || loader.load(&namespace))
        .await
        .context("key loading task")??;
    info!(namespace = %config.key_namespace, kid = signing.kid(), "Signing keys ready");

    let repository: Arc<dyn CredentialRepository> = match config.store_backend {
        StoreBackend::Postgres => {
            let repository = PgCredentialRepository::connect(&config.database)
                .await
                .context("connecting to database")?;
            repository.migrate().await.context("creating schema")?;
            info!(host = %config.database.host, dbname = %config.database.dbname, "Credential store connected");
            Arc::new(repository)
        }
        StoreBackend::Memory => {
            info!("Using in-memory credential store");
            Arc::new(InMemoryCredentialRepository::new())
        }
    };

    let hasher = CredentialHasher::new(config.hash_cost)?;
    let facade = Arc::new(AuthorityFacade::new(
        CredentialStore::new(repository, hasher),
        keys,
        config.token_issuer.clone(),
        config.token_ttl,
        config.environment,
    ));

    let shutdown = Shutdown::new();
    let server = Server::builder()
        .add_service(AuthServiceImpl::new(facade).into_server())
        .serve_with_shutdown(addr, shutdown.signal());

    info!(%addr, "Credential authority listening");

    run_with_graceful_shutdown(server, shutdown, wait_for_signal(), config.shutdown_timeout)
        .await
        .context("serving")?;

    Ok(())
}
