use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::{
        adapter::ChannelAdapters, database::PostgresAuditSink, health::HealthChecker,
        memory::MemorySecretStore, profile_store::ProfileStoreClient, redis::RedisSecretStore,
        template::TemplateRenderer,
    },
    config::{AuditSinkBackend, Config, SecretStoreBackend},
    error::ProfileStoreError,
    models::{
        channel::Channel,
        dispatch::DispatchResult,
        event::EventKind,
        health::HealthStatus,
        recipient::Recipient,
        request::{DispatchRequest, Validate, VerifySecretRequest},
        response::{ApiResponse, VerifySecretResponse},
    },
    services::{
        dispatcher::{DispatchSettings, Dispatcher},
        recorder::{DeliveryRecorder, DeliverySink},
        secret::{SecretIssuer, SecretStore},
    },
};

pub struct AppState {
    dispatcher: Dispatcher,
    profile_store: ProfileStoreClient,
    health_checker: HealthChecker,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        profile_store: ProfileStoreClient,
        health_checker: HealthChecker,
    ) -> Self {
        Self {
            dispatcher,
            profile_store,
            health_checker,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let profile_store = ProfileStoreClient::new(
            &config.profile_store_url,
            &config.profile_store_api_key,
            config.profile_store_timeout(),
        )?;

        let secret_store: Arc<dyn SecretStore> = match config.secret_store {
            SecretStoreBackend::ProfileStore => Arc::new(profile_store.clone()),
            SecretStoreBackend::Redis => {
                let redis_url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("REDIS_URL is required when SECRET_STORE=redis"))?;
                Arc::new(RedisSecretStore::connect(redis_url).await?)
            }
            SecretStoreBackend::Memory => {
                warn!("Using in-process secret store, secrets are lost on restart");
                Arc::new(MemorySecretStore::new())
            }
        };

        let audit_sink: Arc<dyn DeliverySink> = match config.audit_sink {
            AuditSinkBackend::ProfileStore => Arc::new(profile_store.clone()),
            AuditSinkBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("DATABASE_URL is required when AUDIT_SINK=postgres"))?;
                let sink = PostgresAuditSink::connect(database_url).await?;
                sink.ensure_schema().await?;
                Arc::new(sink)
            }
        };

        let renderer = Arc::new(TemplateRenderer::with_builtin()?);
        let adapters = ChannelAdapters::from_config(config).await?;

        let dispatcher = Dispatcher::new(
            renderer,
            adapters.clone(),
            SecretIssuer::new(secret_store),
            DeliveryRecorder::new(audit_sink, config.audit_retry_config()),
            DispatchSettings::from_config(config),
        );
        let health_checker = HealthChecker::new(config.clone(), profile_store.clone(), adapters);

        Ok(Self::new(dispatcher, profile_store, health_checker))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/notifications", post(send_notification))
        .route("/api/v1/secrets/verify", post(verify_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(config: Config) -> Result<(), Error> {
    let state = Arc::new(AppState::from_config(&config).await?);
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn resolve_recipient(
    profile_store: &ProfileStoreClient,
    request: &DispatchRequest,
) -> Result<Recipient, ProfileStoreError> {
    match request.recipient_id.as_deref().map(str::trim) {
        Some(recipient_id) if !recipient_id.is_empty() => {
            profile_store.get_recipient(recipient_id).await
        }
        _ => {
            let email = request.email.as_deref().map(str::trim).unwrap_or_default();
            profile_store.find_recipient_by_email(email).await
        }
    }
}

async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    if let Err(field_errors) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::invalid(field_errors)),
        )
            .into_response();
    }

    let mut recipient = match resolve_recipient(&state.profile_store, &request).await {
        Ok(recipient) => recipient,
        Err(ProfileStoreError::NotFound) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::error(
                    "recipient_not_found".to_string(),
                    "No recipient matches the given id or email".to_string(),
                )),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "Recipient lookup failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<()>::error(
                    "profile_store_unavailable".to_string(),
                    e.to_string(),
                )),
            )
                .into_response();
        }
    };

    if let Some(phone_number) = &request.phone_number {
        recipient.phone_number = Some(phone_number.trim().to_string());
    }

    let event = request.to_event();

    if event.kind == EventKind::Custom {
        let renderer = state.dispatcher.renderer();
        let missing: Vec<Channel> = event
            .policy
            .channels()
            .filter(|channel| !renderer.has_template(event.template_id(), *channel))
            .collect();

        if !missing.is_empty() {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::error(
                    "template_not_found".to_string(),
                    format!(
                        "Template '{}' has no variant for: {}",
                        event.template_id(),
                        missing
                            .iter()
                            .map(Channel::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )),
            )
                .into_response();
        }
    }

    match state.dispatcher.dispatch(&event, &recipient).await {
        Ok(result) if result.is_empty() => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error_with_data(
                result,
                "no_deliverable_channel".to_string(),
                "Recipient cannot be reached on any channel this event may use".to_string(),
            )),
        )
            .into_response(),
        Ok(result) => {
            mark_stale_push_token(&state, &recipient, &result);

            let message = format!(
                "Delivered on {} of {} channel(s)",
                result.success_count(),
                result.outcomes.len()
            );
            let body = if result.any_delivered() {
                ApiResponse::success(result, message)
            } else {
                ApiResponse::error_with_data(result, "all_channels_failed".to_string(), message)
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Dispatch aborted");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<()>::error(
                    "dispatch_failed".to_string(),
                    e.to_string(),
                )),
            )
                .into_response()
        }
    }
}

/// Flags the push token stale when the provider says it is permanently invalid.
fn mark_stale_push_token(state: &Arc<AppState>, recipient: &Recipient, result: &DispatchResult) {
    let stale = result
        .outcome(Channel::Push)
        .is_some_and(|outcome| outcome.is_invalid_target());
    if !stale {
        return;
    }

    let profile_store = state.profile_store.clone();
    let recipient_id = recipient.id.clone();
    tokio::spawn(async move {
        if let Err(e) = profile_store
            .mark_channel_invalid(&recipient_id, Channel::Push)
            .await
        {
            warn!(recipient_id = %recipient_id, error = %e, "Failed to mark push token stale");
        }
    });
}

async fn verify_secret(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifySecretRequest>,
) -> Response {
    if let Err(field_errors) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::invalid(field_errors)),
        )
            .into_response();
    }

    let issuer = state.dispatcher.issuer();
    let recipient_id = request.recipient_id.trim();
    let code = request.code.trim();

    let (valid, consumed) = if request.consume {
        match issuer.redeem(recipient_id, request.purpose, code).await {
            Ok(redeemed) => (redeemed, redeemed),
            Err(e) => {
                warn!(recipient_id, error = %e, "Failed to redeem secret");
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiResponse::<()>::error(
                        "secret_store_unavailable".to_string(),
                        e.to_string(),
                    )),
                )
                    .into_response();
            }
        }
    } else {
        (issuer.verify(recipient_id, request.purpose, code).await, false)
    };

    let message = if valid {
        "Secret is valid"
    } else {
        "Secret is invalid or expired"
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            VerifySecretResponse { valid, consumed },
            message.to_string(),
        )),
    )
        .into_response()
}
