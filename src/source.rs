use std::{future::Future, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use tokio::time::timeout;
use tracing::{info, warn};
use zeromq::{Socket as _, SocketRecv as _, SubSocket, ZmqMessage};

/// A feed of raw telemetry messages.
pub trait MessageSource {
    /// Waits for the next message. An error means the feed is gone.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>>>;
}

/// ZeroMQ SUB socket subscribed to every message on the endpoint.
///
/// A SUB socket never notices that its publisher went away: the peer is
/// dropped silently and `recv` waits forever. With an idle timeout set, a
/// subscriber that hears nothing for that long opens a fresh subscription,
/// which picks up a publisher that restarted on the same endpoint. Messages
/// published while the new subscription is being set up are lost.
pub struct ZmqSubscriber {
    socket: SubSocket,

    endpoint: String,

    idle_timeout: Option<Duration>,

    stale: bool,
}

impl ZmqSubscriber {
    pub async fn connect(endpoint: &str, idle_timeout: Option<Duration>) -> Result<Self> {
        let socket = subscribe(endpoint).await?;

        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
            idle_timeout,
            stale: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Replaces the socket with a new subscription.
    ///
    /// Waits while the publisher is down. `stale` is only cleared once the
    /// new socket is subscribed, so a cancelled reconnect resumes on the next
    /// `recv`.
    async fn reconnect(&mut self, attempt_timeout: Duration) -> Result<()> {
        loop {
            match timeout(attempt_timeout, subscribe(&self.endpoint)).await {
                Ok(Ok(socket)) => {
                    self.socket = socket;
                    self.stale = false;
                    info!("resubscribed to '{}'", self.endpoint);
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => warn!(
                    "publisher at '{}' still unreachable after {attempt_timeout:?}, retrying",
                    self.endpoint
                ),
            }
        }
    }
}

impl MessageSource for ZmqSubscriber {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        let Some(idle_timeout) = self.idle_timeout else {
            let message = self
                .socket
                .recv()
                .await
                .with_context(|| format!("failed to receive from '{}'", self.endpoint))?;

            return payload(message, &self.endpoint);
        };

        loop {
            if self.stale {
                self.reconnect(idle_timeout).await?;
            }

            match timeout(idle_timeout, self.socket.recv()).await {
                Ok(message) => {
                    let message = message
                        .with_context(|| format!("failed to receive from '{}'", self.endpoint))?;

                    return payload(message, &self.endpoint);
                }
                Err(_) => {
                    info!(
                        "no message from '{}' for {idle_timeout:?}, resubscribing",
                        self.endpoint
                    );
                    self.stale = true;
                }
            }
        }
    }
}

async fn subscribe(endpoint: &str) -> Result<SubSocket> {
    let mut socket = SubSocket::new();

    socket
        .connect(endpoint)
        .await
        .with_context(|| format!("failed to connect to ZMQ endpoint '{endpoint}'"))?;

    socket
        .subscribe("")
        .await
        .context("failed to subscribe to all messages")?;

    Ok(socket)
}

/// The last frame of a message. Topic frames, if a publisher sends any,
/// precede it.
fn payload(message: ZmqMessage, endpoint: &str) -> Result<Vec<u8>> {
    message
        .into_vec()
        .pop()
        .map(|frame| frame.to_vec())
        .ok_or_else(|| anyhow!("empty ZMQ message from '{endpoint}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_the_last_frame() {
        let mut message = ZmqMessage::from("sensors");
        message.push_back(r#"{"device_id": 5}"#.into());

        assert_eq!(
            payload(message, "tcp://localhost:5555").unwrap(),
            br#"{"device_id": 5}"#
        );
    }

    #[test]
    fn single_frame_is_the_payload() {
        let message = ZmqMessage::from(r#"{"device_id": 5}"#);

        assert_eq!(
            payload(message, "tcp://localhost:5555").unwrap(),
            br#"{"device_id": 5}"#
        );
    }
}
