//! gRPC transport for the authority.
//!
//! Maps wire messages to façade calls. Domain failures travel in the
//! response's `error` field; `Status` errors are left to the transport.

use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{AuthorityError, Result};
use crate::facade::AuthorityFacade;
use crate::identity::Identity;
use crate::metrics;
use crate::proto::auth::v1 as pb;
use crate::proto::auth::v1::auth_service_server::AuthService;
use crate::token::IssuedToken;

pub use crate::proto::auth::v1::auth_service_server::AuthServiceServer;

/// Liveness probe request answered with [`PONG`].
pub const PING: &str = "ping";
/// Answer to [`PING`].
pub const PONG: &str = "pong";
/// Answer to any other probe message.
pub const GREETING: &str = "Hello there!";

/// `auth.v1.AuthService` implementation.
#[derive(Debug, Clone)]
pub struct AuthServiceImpl {
    facade: Arc<AuthorityFacade>,
}

impl AuthServiceImpl {
    /// Serve `facade`.
    #[must_use]
    pub fn new(facade: Arc<AuthorityFacade>) -> Self {
        Self { facade }
    }

    /// Wrap into a tonic server.
    #[must_use]
    pub fn into_server(self) -> AuthServiceServer<Self> {
        AuthServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn create_auth(
        &self,
        request: Request<pb::AuthRequest>,
    ) -> std::result::Result<Response<pb::AuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();
        let password = Zeroizing::new(req.password);

        let result = match parse_identity(req.identity) {
            Ok(identity) => {
                self.facade
                    .signup(&identity, &password, ttl(req.ttl_seconds))
                    .await
            }
            Err(e) => Err(e),
        };

        observe("CreateAuth", start);
        Ok(Response::new(auth_response(result)))
    }

    async fn update_auth(
        &self,
        request: Request<pb::UpdateAuthRequest>,
    ) -> std::result::Result<Response<pb::AuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();
        let old_password = Zeroizing::new(req.old_password);
        let new_password = Zeroizing::new(req.new_password);

        let result = match parse_identity(req.identity) {
            Ok(identity) => {
                self.facade
                    .change_password(&identity, &old_password, &new_password, ttl(req.ttl_seconds))
                    .await
            }
            Err(e) => Err(e),
        };

        observe("UpdateAuth", start);
        Ok(Response::new(auth_response(result)))
    }

    async fn delete_auth(
        &self,
        request: Request<pb::DeleteAuthRequest>,
    ) -> std::result::Result<Response<pb::DeleteAuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let result = match parse_identity(req.identity) {
            Ok(identity) => self.facade.delete_account(&identity).await,
            Err(e) => Err(e),
        };

        observe("DeleteAuth", start);
        Ok(Response::new(pb::DeleteAuthResponse {
            error: result.err().as_ref().map(wire_error),
        }))
    }

    async fn grant_auth(
        &self,
        request: Request<pb::AuthRequest>,
    ) -> std::result::Result<Response<pb::AuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();
        let password = Zeroizing::new(req.password);

        let result = match parse_identity(req.identity) {
            Ok(identity) => {
                self.facade
                    .login(&identity, &password, ttl(req.ttl_seconds))
                    .await
            }
            Err(e) => Err(e),
        };

        observe("GrantAuth", start);
        Ok(Response::new(auth_response(result)))
    }

    async fn verify_credentials(
        &self,
        request: Request<pb::CredentialsRequest>,
    ) -> std::result::Result<Response<pb::VerifyResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();
        let password = Zeroizing::new(req.password);

        let result = match parse_identity(req.identity) {
            Ok(identity) => self.facade.verify_credentials(&identity, &password).await,
            Err(e) => Err(e),
        };

        observe("VerifyCredentials", start);
        Ok(Response::new(pb::VerifyResponse {
            success: result.is_ok(),
            error: result.err().as_ref().map(wire_error),
        }))
    }

    async fn verify_token(
        &self,
        request: Request<pb::TokenRequest>,
    ) -> std::result::Result<Response<pb::AuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let result = self.facade.verify_token(&req.token);

        observe("VerifyToken", start);
        Ok(Response::new(auth_response(result)))
    }

    async fn refresh_token(
        &self,
        request: Request<pb::TokenRequest>,
    ) -> std::result::Result<Response<pb::AuthResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let result = self.facade.refresh_token(&req.token, ttl(req.ttl_seconds));

        observe("RefreshToken", start);
        Ok(Response::new(auth_response(result)))
    }

    async fn get_public_key(
        &self,
        request: Request<pb::PublicKeyRequest>,
    ) -> std::result::Result<Response<pb::PublicKeyResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let response = match self.facade.export_public_key(req.namespace.trim()).await {
            Ok(public_key) => pb::PublicKeyResponse {
                public_key,
                error: None,
            },
            Err(e) => pb::PublicKeyResponse {
                public_key: Vec::new(),
                error: Some(wire_error(&e)),
            },
        };

        observe("GetPublicKey", start);
        Ok(Response::new(response))
    }

    async fn flush_db(
        &self,
        request: Request<pb::FlushDbRequest>,
    ) -> std::result::Result<Response<pb::FlushDbResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let result = self.facade.reset(&req.reason).await;

        observe("FlushDB", start);
        Ok(Response::new(pb::FlushDbResponse {
            error: result.err().as_ref().map(wire_error),
        }))
    }

    async fn ping(
        &self,
        request: Request<pb::PingRequest>,
    ) -> std::result::Result<Response<pb::PingResponse>, Status> {
        let req = request.into_inner();
        let message = if req.message == PING { PONG } else { GREETING };
        Ok(Response::new(pb::PingResponse {
            message: message.to_string(),
        }))
    }
}

fn observe(method: &str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    metrics::record_grpc_latency(method, elapsed);
    debug!(method, elapsed, "Request handled");
}

fn ttl(seconds: u64) -> Option<u64> {
    (seconds > 0).then_some(seconds)
}

fn parse_identity(identity: Option<pb::Identity>) -> Result<Identity> {
    let identity = identity.ok_or_else(|| AuthorityError::invalid_input("identity is required"))?;
    Identity::parse(&identity.user_id, &identity.app_id)
}

fn wire_identity(identity: &Identity) -> pb::Identity {
    pb::Identity {
        user_id: identity.user_id.to_string(),
        app_id: identity.app_id.to_string(),
    }
}

fn wire_error(err: &AuthorityError) -> pb::Error {
    pb::Error {
        code: err.kind().as_str().to_string(),
        message: err.public_message(),
    }
}

fn auth_response(result: Result<IssuedToken>) -> pb::AuthResponse {
    match result {
        Ok(issued) => pb::AuthResponse {
            identity: Some(wire_identity(&issued.identity)),
            token: issued.token,
            expires_at: issued.expires_at,
            error: None,
        },
        Err(e) => pb::AuthResponse {
            identity: None,
            token: String::new(),
            expires_at: 0,
            error: Some(wire_error(&e)),
        },
    }
}
