use super::{Shared, StreamState};
use crate::{
    error::RunError,
    generator::WorkGenerator,
    transport::{open_stream, Credentials, UnaryClient},
};
use calcbench_core::RESULTS_PATH;
use calcbench_server::{FrameStream, StreamError};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

pub(super) async fn run(shared: Arc<Shared>, credentials: Arc<Credentials>) -> Result<(), RunError> {
    let config = &shared.config;
    info!(
        "Running in unary mode with client-id={}, workers={}, interval={}ms, total transactions={}",
        config.client_id,
        config.workers,
        config.interval.as_millis(),
        config.transactions
    );

    let client = Arc::new(UnaryClient::new(
        &config.host,
        &config.client_id,
        credentials.clone(),
    )?);

    let mut state = StreamState::Opening;
    let stream = open_stream(&config.host, RESULTS_PATH, &config.client_id, &credentials).await?;
    state.advance(StreamState::Open, "results");

    let stop_receiving = CancellationToken::new();
    let receiver = tokio::spawn(
        receive_results(stream, state, shared.clone(), stop_receiving.clone()).in_current_span(),
    );

    shared.ledger.start();
    let generator = WorkGenerator::new(config.transactions, config.workers, config.interval);
    let send = {
        let shared = shared.clone();
        move |worker: usize, id: i32| {
            let shared = shared.clone();
            let client = client.clone();
            async move { send_one(&shared, &client, worker, id).await }
        }
    };
    generator.run(send, CancellationToken::new()).await;

    info!("All workers done. Waiting for pending responses...");
    shared
        .inflight
        .drain(Instant::now() + config.drain_grace)
        .await;
    shared.ledger.stop();

    stop_receiving.cancel();
    receiver.await?;
    Ok(())
}

async fn send_one(shared: &Shared, client: &UnaryClient, worker: usize, id: i32) {
    let calculation = shared.transaction(id);
    let id = calculation.id;
    let envelope = match shared.codec.seal(&calculation) {
        Ok(envelope) => envelope,
        Err(err) => {
            shared.send_error();
            error!("Worker {worker}: unable to encode transaction {id}: {err}");
            return;
        }
    };

    shared.ledger.record_sent(calculation);
    match client.calculate(envelope).await {
        Ok(()) => {
            shared.counters.record_sent();
            shared.inflight.accept();
            debug!("Worker {worker}: sent transaction {id}");
        }
        Err(err) if err.is_rejection() => shared.rejected(Some(id), &err.to_string()),
        Err(err) => {
            shared.send_error();
            debug!("Worker {worker}: error sending transaction {id}: {err}");
        }
    }
}

/// Feed every result frame into the ledger until the server closes the
/// stream, it breaks, or `stop` fires. A broken stream is not reopened; a
/// frame that fails to decode is skipped.
async fn receive_results<S: FrameStream>(
    mut stream: S,
    mut state: StreamState,
    shared: Arc<Shared>,
    stop: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = stream.recv_reply() => frame,
        };

        match frame {
            Some(Ok(reply)) => {
                state.advance(StreamState::Delivering, "results");
                shared.handle_reply(reply);
            }
            Some(Err(StreamError::Frame(err))) => {
                warn!("Discarding undecodable result frame: {err}");
            }
            Some(Err(err)) => {
                warn!("Response stream closed: {err}");
                break;
            }
            None => {
                info!("Response stream closed by server");
                break;
            }
        }
    }

    if let Err(err) = FrameStream::close(&mut stream).await {
        debug!("Error closing response stream: {err}");
    }
    state.advance(StreamState::Closed, "results");
}
