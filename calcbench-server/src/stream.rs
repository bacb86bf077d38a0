use crate::error::StreamError;
use calcbench_core::Reply;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

/// A message-oriented, bidirectional byte stream.
///
/// `recv_bytes` yields `None` once the peer has closed. Control frames are
/// handled underneath and never surface here. `close` is valid on either
/// side of the handshake: it starts it, or answers a close already received.
pub trait FrameStream {
    async fn recv_bytes(&mut self) -> Option<Result<Vec<u8>, StreamError>>;
    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), StreamError>;
    async fn close(&mut self) -> Result<(), StreamError>;

    async fn recv_reply(&mut self) -> Option<Result<Reply, StreamError>> {
        let bytes = self.recv_bytes().await?;

        Some(match bytes {
            Ok(bytes) => Reply::from_bytes(&bytes).map_err(StreamError::from),
            Err(err) => Err(err),
        })
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), StreamError> {
        let bytes = reply.to_bytes()?;
        self.send_bytes(bytes).await
    }
}

impl FrameStream for axum::extract::ws::WebSocket {
    async fn recv_bytes(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
        use axum::extract::ws::Message as AxumMessage;
        loop {
            let message = self.recv().await?;
            return Some(match message {
                Ok(AxumMessage::Binary(bytes)) => Ok(bytes),
                Ok(AxumMessage::Ping(_) | AxumMessage::Pong(_)) => continue,
                Ok(AxumMessage::Close(_)) => return None,
                Ok(AxumMessage::Text(_)) => Err(StreamError::InvalidType),
                Err(err) => Err(StreamError::from(err)),
            });
        }
    }

    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), StreamError> {
        use axum::extract::ws::Message as AxumMessage;
        self.send(AxumMessage::Binary(bytes)).await?;
        Ok(())
    }

    /// Completes the closing handshake. After the peer closed first this
    /// only flushes the queued close reply.
    async fn close(&mut self) -> Result<(), StreamError> {
        use axum::extract::ws::Message as AxumMessage;
        <Self as SinkExt<AxumMessage>>::close(self).await?;
        Ok(())
    }
}

impl<T> FrameStream for tokio_tungstenite::WebSocketStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn recv_bytes(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
        use tungstenite::protocol::Message as TMessage;
        loop {
            let message = self.next().await?;
            return Some(match message {
                Ok(TMessage::Binary(bytes)) => Ok(bytes),
                Ok(TMessage::Ping(_) | TMessage::Pong(_) | TMessage::Frame(_)) => continue,
                Ok(TMessage::Close(_)) => return None,
                Ok(TMessage::Text(_)) => Err(StreamError::InvalidType),
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(err) => Err(StreamError::from(err)),
            });
        }
    }

    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), StreamError> {
        use tungstenite::protocol::Message as TMessage;
        <Self as SinkExt<TMessage>>::send(self, TMessage::Binary(bytes)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        use tungstenite::protocol::Message as TMessage;
        <Self as SinkExt<TMessage>>::close(self).await?;
        Ok(())
    }
}
