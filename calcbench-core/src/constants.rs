use std::time::Duration;

pub const DEFAULT_PORT: u16 = 50051;

/// Outbound results buffered per subscriber before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// How long a finished run waits for in-flight responses.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

pub const CLIENT_ID_HEADER: &str = "clientid";
pub const AUTHORIZATION_HEADER: &str = "authorization";

pub const CALCULATE_PATH: &str = "/calculate";
pub const RESULTS_PATH: &str = "/results";
pub const BIDI_PATH: &str = "/bidi";

pub const DEFAULT_JWT_SECRET: &str = "calcbench-dev-secret";
pub const DEFAULT_SIGNING_PASSPHRASE: &str = "calcbench-dev-signer";
