//! Streaming link to the live-value endpoint.
//!
//! A [`StreamConnector`] opens one connection and hands back a pair of
//! channels: text frames to send, text frames received. Reconnection and
//! subscription bookkeeping live a layer up; a link is single-use and its
//! inbound channel closing means the transport dropped.
//!
//! ```rust,ignore
//! use scadalink_api::{StreamConnector, WsConnector};
//!
//! let url = router.build_websocket_url(Some("agent-7"));
//! let mut link = WsConnector.open(url).await?;
//! link.outbound.send(r#"{"type":"watch","key":{...}}"#.into())?;
//! while let Some(text) = link.inbound.recv().await {
//!     println!("{text}");
//! }
//! ```

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use url::Url;

use crate::error::Error;

// ── StreamLink ───────────────────────────────────────────────────────

/// One open streaming connection, as a pair of text channels.
///
/// Dropping `outbound` closes the connection. `inbound` yields `None` once
/// the connection is gone, for whatever reason.
#[derive(Debug)]
pub struct StreamLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl StreamLink {
    /// Build a link and the opposite ends of its two channels.
    ///
    /// Returns `(link, frames_sent_by_link, sender_into_link)`.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

// ── StreamConnector ──────────────────────────────────────────────────

/// Opens streaming links. The production impl is [`WsConnector`]; tests
/// substitute an in-process one.
pub trait StreamConnector: Send + Sync + 'static {
    fn open(&self, url: Url) -> BoxFuture<'static, Result<StreamLink, Error>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl StreamConnector for WsConnector {
    fn open(&self, url: Url) -> BoxFuture<'static, Result<StreamLink, Error>> {
        Box::pin(connect(url))
    }
}

fn check_scheme(url: &Url) -> Result<(), Error> {
    match url.scheme() {
        "wss" => Ok(()),
        #[cfg(feature = "test-util")]
        "ws" => Ok(()),
        _ => Err(Error::PlaintextRejected(url.to_string())),
    }
}

async fn connect(url: Url) -> Result<StreamLink, Error> {
    check_scheme(&url)?;
    tracing::info!(%url, "connecting live stream");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::StreamConnect(e.to_string()))?;

    tracing::info!("live stream connected");

    let (link, mut out_rx, in_tx) = StreamLink::pair();
    let (mut write, mut read) = ws_stream.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                outgoing = out_rx.recv() => {
                    let Some(text) = outgoing else {
                        tracing::debug!("live stream link dropped, closing");
                        let _ = write.close().await;
                        break;
                    };
                    if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                        tracing::warn!(error = %e, "live stream send failed");
                        break;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if in_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // pong replies are automatic
                        tracing::trace!("live stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "live stream closed by server");
                        } else {
                            tracing::info!("live stream closed by server");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "live stream read failed");
                        break;
                    }
                    None => {
                        tracing::info!("live stream ended");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    });

    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_stream_urls_are_rejected() {
        let url = Url::parse("ws://scada.local:8080/").unwrap();
        let result = check_scheme(&url);
        if cfg!(feature = "test-util") {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(Error::PlaintextRejected(_))));
        }

        let url = Url::parse("wss://scada.local/").unwrap();
        assert!(check_scheme(&url).is_ok());
    }

    #[tokio::test]
    async fn pair_wires_both_directions() {
        let (mut link, mut sent, inject) = StreamLink::pair();

        link.outbound.send("hello".into()).unwrap();
        assert_eq!(sent.recv().await.as_deref(), Some("hello"));

        inject.send("world".into()).unwrap();
        assert_eq!(link.inbound.recv().await.as_deref(), Some("world"));

        drop(inject);
        assert!(link.inbound.recv().await.is_none());
    }
}
