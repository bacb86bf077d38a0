use crate::{
    error::{ProcessError, ServerError},
    registry::SubscriberRegistry,
    service::CalcService,
    session::{serve_bidi, serve_results},
};
use axum::{
    body::Bytes,
    extract::{
        connect_info::ConnectInfo,
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use calcbench_core::{
    bearer_token, AuthError, Authenticator, Reply, AUTHORIZATION_HEADER, BIDI_PATH,
    CALCULATE_PATH, CLIENT_ID_HEADER, RESULTS_PATH,
};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument, warn};

pub(crate) struct ServerState {
    pub service: CalcService,
    pub registry: Arc<SubscriberRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub cancel: CancellationToken,
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(CALCULATE_PATH, post(calculate))
        .route(RESULTS_PATH, get(results))
        .route(BIDI_PATH, get(bidi))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub(crate) async fn server_task(
    listener: TcpListener,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let cancel = state.cancel.clone();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    debug!("Axum server starting up...");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    debug!("Axum server stopped");

    Ok(())
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error("Missing clientid header")]
    MissingClientId,

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        use HandlerError::*;
        let status = match &self {
            Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MissingClientId | Process(ProcessError::Calculation(_)) => StatusCode::BAD_REQUEST,
            Process(ProcessError::Verify(_) | ProcessError::Sign(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        warn!("Request failed with {status}: {self}");
        (status, self.to_string()).into_response()
    }
}

fn authenticate(state: &ServerState, headers: &HeaderMap) -> Result<(), HandlerError> {
    let header = headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|value| value.to_str().ok());
    let claims = state.authenticator.authenticate(bearer_token(header)?)?;
    debug!("Authenticated {}", claims.sub);
    Ok(())
}

fn client_id(headers: &HeaderMap) -> Result<&str, HandlerError> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
        .ok_or(HandlerError::MissingClientId)
}

#[instrument(skip_all)]
async fn calculate(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HandlerError> {
    authenticate(&state, &headers)?;
    let client_id = client_id(&headers)?;

    let signed = state.service.process(&body)?;
    state.registry.dispatch(client_id, Reply::Result(signed));

    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(%addr))]
async fn results(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HandlerError> {
    authenticate(&state, &headers)?;
    let client_id = client_id(&headers)?;

    // Registered before the upgrade completes so results dispatched right
    // after the handshake already have a queue.
    let subscription = state.registry.register(client_id);
    let cancel = state.cancel.clone();

    Ok(ws.on_upgrade(move |mut socket: WebSocket| async move {
        if let Err(err) = serve_results(&mut socket, subscription, cancel).await {
            warn!("Result stream to {addr} failed: {err}");
        }
    }))
}

#[instrument(skip_all, fields(%addr))]
async fn bidi(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HandlerError> {
    authenticate(&state, &headers)?;

    Ok(ws.on_upgrade(move |mut socket: WebSocket| async move {
        let cancel = state.cancel.clone();
        if let Err(err) = serve_bidi(&mut socket, &state.service, cancel).await {
            warn!("Bidirectional stream with {addr} failed: {err}");
        }
    }))
}
