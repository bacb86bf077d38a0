//! Server runtime.
//!
//! Binds the listener, wires the collaborators into the router and hands
//! back a [`RunningServer`] that can be observed and shut down.
use crate::{
    error::ServerError,
    registry::SubscriberRegistry,
    server::{server_task, ServerState},
    service::CalcService,
};
use calcbench_core::{
    Ed25519Signer, JwtAuthority, DEFAULT_JWT_SECRET, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SIGNING_PASSPHRASE,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, Instrument};

#[derive(Parser, Debug)]
#[command(version, about = "Calculator service for the calcbench harness")]
pub struct ServerCli {
    #[arg(long, default_value = "0.0.0.0")]
    pub ip: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, default_value = DEFAULT_JWT_SECRET)]
    pub jwt_secret: String,

    #[arg(long, default_value = DEFAULT_SIGNING_PASSPHRASE)]
    pub signing_passphrase: String,

    /// Results buffered per client before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Calculator server builder.
///
/// # Example
///
/// ```ignore
/// let server = CalcServer::new().port(0).bind().await?;
/// println!("listening on {}", server.local_addr());
/// server.wait().await?;
/// ```
pub struct CalcServer {
    ip: String,
    port: u16,
    jwt_secret: String,
    signing_passphrase: String,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl Default for CalcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl CalcServer {
    pub fn new() -> Self {
        CalcServer {
            ip: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            signing_passphrase: DEFAULT_SIGNING_PASSPHRASE.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }

    /// Take every setting from parsed command-line arguments.
    pub fn with_args(mut self, args: &ServerCli) -> Self {
        self.ip = args.ip.clone();
        self.port = args.port;
        self.jwt_secret = args.jwt_secret.clone();
        self.signing_passphrase = args.signing_passphrase.clone();
        self.queue_capacity = args.queue_capacity;
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn jwt_secret(mut self, secret: &str) -> Self {
        self.jwt_secret = secret.to_string();
        self
    }

    pub fn signing_passphrase(mut self, passphrase: &str) -> Self {
        self.signing_passphrase = passphrase.to_string();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Shut down when `cancel` fires instead of on a private token.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(name = "calcbench-server", skip_all, fields(port = self.port))]
    pub async fn bind(self) -> Result<RunningServer, ServerError> {
        let socket_addr: SocketAddr = format!("{}:{}", self.ip, self.port).parse()?;
        let listener = tokio::net::TcpListener::bind(socket_addr).await?;
        let local_addr = listener.local_addr()?;

        let registry = SubscriberRegistry::new(self.queue_capacity);
        let signer = Ed25519Signer::from_passphrase(&self.signing_passphrase);
        let state = Arc::new(ServerState {
            service: CalcService::new(Arc::new(signer)),
            registry: registry.clone(),
            authenticator: Arc::new(JwtAuthority::new(self.jwt_secret.as_bytes())),
            cancel: self.cancel.clone(),
        });

        let handle = tokio::spawn(server_task(listener, state).in_current_span());
        info!("Listening on {local_addr}");

        Ok(RunningServer {
            local_addr,
            registry,
            cancel: self.cancel,
            handle,
        })
    }

    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.wait().await
    }
}

pub struct RunningServer {
    local_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<(), ServerError> {
        self.handle.await?
    }
}
