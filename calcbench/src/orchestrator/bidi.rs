use super::{Shared, StreamState};
use crate::{
    error::RunError,
    generator::WorkGenerator,
    transport::{open_stream, ClientStream, Credentials},
};
use calcbench_core::{BIDI_PATH, DEFAULT_QUEUE_CAPACITY};
use calcbench_server::{FrameStream, StreamError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

pub(super) async fn run(shared: Arc<Shared>, credentials: Arc<Credentials>) -> Result<(), RunError> {
    let config = &shared.config;
    info!(
        "Running in bidirectional mode with client-id={}, interval={}ms, total transactions={}",
        config.client_id,
        config.interval.as_millis(),
        config.transactions
    );

    let mut state = StreamState::Opening;
    let stream = open_stream(&config.host, BIDI_PATH, &config.client_id, &credentials).await?;
    state.advance(StreamState::Open, "bidirectional");

    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Vec<u8>>(DEFAULT_QUEUE_CAPACITY);
    let stop_receiving = CancellationToken::new();
    let mut connection = tokio::spawn(
        drive(stream, state, outgoing_rx, shared.clone(), stop_receiving.clone())
            .in_current_span(),
    );

    shared.ledger.start();
    let send = {
        let shared = shared.clone();
        move |_worker: usize, id: i32| {
            let shared = shared.clone();
            let outgoing = outgoing_tx.clone();
            async move { queue_one(&shared, &outgoing, id).await }
        }
    };
    // Dropping the last sender half-closes the stream.
    WorkGenerator::single(config.transactions, config.interval)
        .run(send, CancellationToken::new())
        .await;

    info!("All transactions sent. Waiting for pending responses...");
    let deadline = Instant::now() + config.drain_grace;
    shared.inflight.drain(deadline).await;
    shared.ledger.stop();

    // The server closes its side once it has answered everything.
    match tokio::time::timeout_at(deadline, &mut connection).await {
        Ok(res) => res?,
        Err(_) => {
            debug!("Server did not close the stream in time");
            stop_receiving.cancel();
            connection.await?;
        }
    }
    Ok(())
}

async fn queue_one(shared: &Shared, outgoing: &mpsc::Sender<Vec<u8>>, id: i32) {
    let calculation = shared.transaction(id);
    let id = calculation.id;
    let envelope = match shared.codec.seal(&calculation) {
        Ok(envelope) => envelope,
        Err(err) => {
            shared.send_error();
            error!("Unable to encode message {id}: {err}");
            return;
        }
    };

    shared.ledger.record_sent(calculation);
    if outgoing.send(envelope).await.is_err() {
        shared.send_error();
        debug!("Error sending message {id}: stream is gone");
        return;
    }
    shared.counters.record_sent();
    shared.inflight.accept();
    debug!("Sent bidirectional message {id}");
}

/// Both directions of the stream on one task. Sending ends with a close
/// frame once `outgoing` runs dry; receiving carries on until the server
/// closes, the stream breaks, or `stop` fires.
async fn drive(
    mut stream: ClientStream,
    mut state: StreamState,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
    stop: CancellationToken,
) {
    let mut sending = true;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            envelope = outgoing.recv(), if sending => match envelope {
                Some(envelope) => {
                    if let Err(err) = stream.send_bytes(envelope).await {
                        warn!("Error sending message: {err}");
                        break;
                    }
                }
                None => {
                    sending = false;
                    match FrameStream::close(&mut stream).await {
                        Ok(()) => debug!("Send direction closed"),
                        Err(err) => warn!("Error closing bidirectional stream: {err}"),
                    }
                }
            },
            frame = stream.recv_reply() => match frame {
                Some(Ok(reply)) => {
                    state.advance(StreamState::Delivering, "bidirectional");
                    shared.handle_reply(reply);
                }
                Some(Err(StreamError::Frame(err))) => {
                    warn!("Discarding undecodable reply frame: {err}");
                }
                Some(Err(err)) => {
                    warn!("Bidirectional receive error: {err}");
                    break;
                }
                None => {
                    debug!("Server closed bidirectional stream");
                    break;
                }
            },
        }
    }

    state.advance(StreamState::Closed, "bidirectional");
}
