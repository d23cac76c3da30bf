use libp2p::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, error};

use signwall_shared::protocol::ChannelMessage;
use signwall_shared::types::GroupId;

use crate::swarm::{SwarmCommand, SwarmNotification};

pub async fn publish_message(
    cmd_tx: &mpsc::Sender<SwarmCommand>,
    group_id: &GroupId,
    message: &ChannelMessage,
) -> anyhow::Result<()> {
    let topic = group_id.to_topic();

    let data = message
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("Serialization error: {e}"))?;

    debug!(topic = %topic, len = data.len(), "Publishing channel message");

    cmd_tx
        .send(SwarmCommand::PublishMessage { topic, data })
        .await
        .map_err(|_| anyhow::anyhow!("Swarm command channel closed"))?;

    Ok(())
}

pub fn decode_message(data: &[u8]) -> anyhow::Result<ChannelMessage> {
    ChannelMessage::from_bytes(data).map_err(|e| anyhow::anyhow!("Deserialization error: {e}"))
}

/// Checks if a notification is a message on the given group's topic, and
/// decodes it if so.
pub fn try_decode_notification(
    notification: &SwarmNotification,
    group_id: &GroupId,
) -> Option<(Option<PeerId>, ChannelMessage)> {
    match notification {
        SwarmNotification::MessageReceived { source, topic, data } => {
            if topic != &group_id.to_topic() {
                return None;
            }

            match decode_message(data) {
                Ok(msg) => Some((*source, msg)),
                Err(e) => {
                    error!(topic = %topic, error = %e, "Failed to decode channel message");
                    None
                }
            }
        }
        _ => None,
    }
}
