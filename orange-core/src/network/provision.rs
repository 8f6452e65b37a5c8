//! One-shot provisioning of a fresh device.
//!
//! Opens a short-lived socket to the device, tells it which cluster to
//! join, gives it a moment to act, and closes. Nothing here touches the
//! main session.

use std::time::Duration;

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::info;

use crate::error::OrangeError;
use crate::network::address::normalize;
use crate::protocol::outbound::join_cluster;

/// Send `join_cluster` to `target`, pointing it at `master_url`.
///
/// `connect_timeout` bounds the dial and the send; `settle` is how long
/// the socket stays open after the command so the device can read it.
pub async fn provision(
    target: &str,
    master_url: &str,
    token: &str,
    connect_timeout: Duration,
    settle: Duration,
) -> Result<(), OrangeError> {
    let url = normalize(target, "")?;
    let command = serde_json::to_string(&join_cluster(token, master_url))?;

    let (mut stream, _) = tokio::time::timeout(
        connect_timeout,
        tokio_tungstenite::connect_async(url.as_str()),
    )
    .await
    .map_err(|_| OrangeError::Timeout(connect_timeout))??;

    tokio::time::timeout(connect_timeout, stream.send(Message::Text(command.into())))
        .await
        .map_err(|_| OrangeError::Timeout(connect_timeout))??;
    info!(%url, master_url, "join_cluster sent");

    tokio::time::sleep(settle).await;

    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "provisioned".into(),
    }));
    tokio::time::timeout(connect_timeout, stream.send(close))
        .await
        .map_err(|_| OrangeError::Timeout(connect_timeout))??;
    Ok(())
}
