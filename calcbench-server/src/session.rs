//! Server-side stream loops.
//!
//! A result stream walks `Registered -> queued delivery -> Unregistered`.
//! Whatever ends the loop, the [`Subscription`] is dropped on the way out and
//! its registry entry released exactly once.
use crate::{
    error::{ProcessError, StreamError},
    registry::Subscription,
    service::CalcService,
    stream::FrameStream,
};
use calcbench_core::Reply;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Drain `subscription` onto `stream` until the queue closes, the client goes
/// away or `cancel` fires.
pub async fn serve_results<S: FrameStream>(
    stream: &mut S,
    subscription: Subscription,
    cancel: CancellationToken,
) -> Result<(), StreamError> {
    let client_id = subscription.client_id().to_string();
    debug!("Result stream registered for client {client_id}");

    let res = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Result stream for client {client_id} cancelled");
                break Ok(());
            }
            reply = subscription.recv() => match reply {
                Some(reply) => {
                    if let Err(err) = stream.send_reply(&reply).await {
                        break Err(err);
                    }
                }
                None => {
                    debug!("Queue for client {client_id} closed");
                    break Ok(());
                }
            },
            incoming = stream.recv_bytes() => match incoming {
                None => {
                    debug!("Client {client_id} closed its result stream");
                    break Ok(());
                }
                Some(Ok(_)) => trace!("Ignoring inbound frame on result stream"),
                Some(Err(err)) => break Err(err),
            },
        }
    };

    drop(subscription);
    let _ = stream.close().await;
    info!("Result stream for client {client_id} unregistered");
    res
}

/// Answer each request on the same stream it arrived on.
///
/// Requests that fail verification are dropped; unknown operations and
/// malformed records are answered with [`Reply::Rejected`]. Neither ends
/// the stream.
pub async fn serve_bidi<S: FrameStream>(
    stream: &mut S,
    service: &CalcService,
    cancel: CancellationToken,
) -> Result<(), StreamError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Bidirectional stream cancelled");
                break;
            }
            frame = stream.recv_bytes() => frame,
        };

        let Some(envelope) = frame else {
            debug!("Client finished sending");
            break;
        };
        let envelope = envelope?;

        match service.process(&envelope) {
            Ok(signed) => stream.send_reply(&Reply::Result(signed)).await?,
            Err(ProcessError::Calculation(err)) => {
                warn!("Rejecting request: {err}");
                let reply = Reply::Rejected {
                    id: err.id(),
                    reason: err.to_string(),
                };
                stream.send_reply(&reply).await?;
            }
            Err(err @ ProcessError::Verify(_)) => warn!("Dropping request: {err}"),
            Err(err @ ProcessError::Sign(_)) => error!("Dropping result: {err}"),
        }
    }

    let _ = stream.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubscriberRegistry;
    use crate::stream::tests::FakeStream;
    use calcbench_core::{Calculation, Ed25519Signer, MessageSigner};
    use std::sync::Arc;
    use std::time::Duration;

    fn reply(n: i32) -> Reply {
        Reply::Rejected {
            id: Some(n),
            reason: String::new(),
        }
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn client_close_unregisters() {
        let registry = SubscriberRegistry::new(10);
        let (mut server, mut client) = FakeStream::duplex();
        let subscription = registry.register("a");

        let task = tokio::spawn(async move {
            serve_results(&mut server, subscription, CancellationToken::new()).await
        });

        registry.dispatch("a", reply(1));
        assert_eq!(client.recv_reply().await.unwrap().unwrap(), reply(1));

        client.close().await.unwrap();
        task.await.unwrap().unwrap();
        assert!(!registry.contains("a"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    #[ntest::timeout(2_000)]
    async fn cancellation_unregisters() {
        let registry = SubscriberRegistry::new(10);
        let (mut server, _client) = FakeStream::duplex();
        let subscription = registry.register("a");
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { serve_results(&mut server, subscription, cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.contains("a"));

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(registry.is_empty());
        assert!(logs_contain("Result stream for client a unregistered"));
    }

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn replaced_subscription_ends_old_stream() {
        let registry = SubscriberRegistry::new(10);
        let (mut server, _client) = FakeStream::duplex();
        let first = registry.register("a");

        let task = tokio::spawn(async move {
            serve_results(&mut server, first, CancellationToken::new()).await
        });

        let _second = registry.register("a");
        task.await.unwrap().unwrap();
        assert!(registry.contains("a"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    #[ntest::timeout(2_000)]
    async fn bidi_survives_bad_messages() {
        let signer = Ed25519Signer::from_passphrase("bidi");
        let service = CalcService::new(Arc::new(signer.clone()));
        let (mut server, mut client) = FakeStream::duplex();

        let task = tokio::spawn(async move {
            serve_bidi(&mut server, &service, CancellationToken::new()).await
        });

        let sign = |calc: Calculation| signer.sign(&calc.to_bytes().unwrap()).unwrap();

        // Forged: dropped without a reply.
        let forged = Ed25519Signer::from_passphrase("forger")
            .sign(&Calculation::new(9, 1, 1, "ADD").to_bytes().unwrap())
            .unwrap();
        client.send_bytes(forged).await.unwrap();

        client
            .send_bytes(sign(Calculation::new(4, 1, 1, "MULTIPLY")))
            .await
            .unwrap();
        client
            .send_bytes(sign(Calculation::new(1, 7, 0, "ISPRIME")))
            .await
            .unwrap();

        match client.recv_reply().await.unwrap().unwrap() {
            Reply::Rejected { id, reason } => {
                assert_eq!(id, Some(4));
                assert!(reason.contains("MULTIPLY"));
            }
            other => panic!("unexpected reply {other:?}"),
        }

        let Reply::Result(envelope) = client.recv_reply().await.unwrap().unwrap() else {
            panic!("expected a result");
        };
        let calc = Calculation::from_bytes(&signer.verify(&envelope).unwrap()).unwrap();
        assert_eq!(calc.id, 1);
        assert!(calc.is_prime);

        client.close().await.unwrap();
        task.await.unwrap().unwrap();
        assert!(client.recv_reply().await.is_none());
        assert!(logs_contain("Dropping request"));
    }
}
