//! Client side of the wire: credentials, the unary HTTP call and the
//! WebSocket streams.
use crate::error::TransportError;
use calcbench_core::{
    bearer_header, AuthError, Calculation, MessageSigner, TokenIssuer, TokenMode,
    AUTHORIZATION_HEADER, CALCULATE_PATH, CLIENT_ID_HEADER, DEFAULT_TOKEN_TTL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::client::IntoClientRequest, MaybeTlsStream, WebSocketStream,
};
use tungstenite::http::HeaderValue;
use url::Url;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Mints bearer tokens according to a [`TokenMode`].
pub struct Credentials {
    issuer: Arc<dyn TokenIssuer>,
    identity: String,
    ttl: Duration,
    cached: Option<String>,
}

impl Credentials {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        identity: &str,
        mode: TokenMode,
    ) -> Result<Self, AuthError> {
        let mut credentials = Self {
            issuer,
            identity: identity.to_string(),
            ttl: DEFAULT_TOKEN_TTL,
            cached: None,
        };
        if mode == TokenMode::Once {
            credentials.cached = Some(credentials.mint()?);
            info!("Generated JWT token (once mode)");
        }
        Ok(credentials)
    }

    pub fn token(&self) -> Result<String, AuthError> {
        match &self.cached {
            Some(token) => Ok(token.clone()),
            None => self.mint(),
        }
    }

    fn mint(&self) -> Result<String, AuthError> {
        self.issuer.issue(&self.identity, self.ttl)
    }
}

/// Signs outbound requests and opens the results of inbound frames.
#[derive(Clone)]
pub struct Codec {
    signer: Arc<dyn MessageSigner>,
}

impl Codec {
    pub fn new(signer: Arc<dyn MessageSigner>) -> Self {
        Self { signer }
    }

    pub fn seal(&self, calculation: &Calculation) -> Result<Vec<u8>, TransportError> {
        Ok(self.signer.sign(&calculation.to_bytes()?)?)
    }

    pub fn open(&self, envelope: &[u8]) -> Result<Calculation, TransportError> {
        Ok(Calculation::from_bytes(&self.signer.verify(envelope)?)?)
    }
}

pub(crate) fn endpoint(scheme: &str, host: &str, path: &str) -> Result<Url, TransportError> {
    Ok(Url::parse(&format!("{scheme}://{host}"))?.join(path)?)
}

/// Fire-and-forget calls to `POST /calculate`.
pub struct UnaryClient {
    http: reqwest::Client,
    url: Url,
    client_id: String,
    credentials: Arc<Credentials>,
}

impl UnaryClient {
    pub fn new(
        host: &str,
        client_id: &str,
        credentials: Arc<Credentials>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            http: reqwest::Client::new(),
            url: endpoint("http", host, CALCULATE_PATH)?,
            client_id: client_id.to_string(),
            credentials,
        })
    }

    pub async fn calculate(&self, envelope: Vec<u8>) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.url.clone())
            .header(AUTHORIZATION_HEADER, bearer_header(&self.credentials.token()?))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Open an authenticated WebSocket to `path` on `host`.
pub async fn open_stream(
    host: &str,
    path: &str,
    client_id: &str,
    credentials: &Credentials,
) -> Result<ClientStream, TransportError> {
    let url = endpoint("ws", host, path)?;
    let mut request = url.as_str().into_client_request()?;

    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION_HEADER,
        HeaderValue::from_str(&bearer_header(&credentials.token()?))?,
    );
    headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(client_id)?);

    let (stream, _) = connect_async(request).await?;
    debug!("Connected to {url}");
    Ok(stream)
}
