/// Counter names emitted through the `metrics` facade.
///
/// Nothing is recorded unless the embedding binary installs a recorder.
pub mod labels {
    pub const SENT: &str = "calcbench_sent";
    pub const RECEIVED: &str = "calcbench_received";
    pub const SEND_ERROR: &str = "calcbench_send_error";
    pub const UNKNOWN_RESPONSE: &str = "calcbench_unknown_response";
    pub const REJECTED: &str = "calcbench_rejected";

    pub const DISPATCH_DELIVERED: &str = "calcbench_dispatch_delivered";
    pub const DISPATCH_DROPPED: &str = "calcbench_dispatch_dropped";
    pub const SUBSCRIBERS: &str = "calcbench_subscribers";

    pub const REASON_QUEUE_FULL: &str = "queue_full";
    pub const REASON_NO_SUBSCRIBER: &str = "no_subscriber";
}
