use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    channel::{ChannelBackend, ChannelError, ChannelMessage, ChannelResult, PresenceEvent},
    dto::{events::RoomEvent, presence::PresenceRecord},
};

/// In-process implementation of the channel contract.
///
/// One entry per topic; each subscriber gets its own unbounded queue so
/// delivery is at-most-once to currently-connected members and FIFO per
/// sender. Every presence mutation emits the incremental delta followed by an
/// authoritative `Sync` snapshot.
#[derive(Clone, Default)]
pub struct LocalHub {
    topics: Arc<DashMap<String, TopicState>>,
}

#[derive(Default)]
struct TopicState {
    members: IndexMap<Uuid, MemberSlot>,
}

struct MemberSlot {
    record: Option<PresenceRecord>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl TopicState {
    fn snapshot(&self) -> IndexMap<Uuid, PresenceRecord> {
        self.members
            .iter()
            .filter_map(|(id, slot)| slot.record.clone().map(|record| (*id, record)))
            .collect()
    }

    /// Send `message` to every connected member, dropping entries whose
    /// receiver is gone.
    fn fan_out(&mut self, message: &ChannelMessage) {
        self.members
            .retain(|_, slot| slot.tx.send(message.clone()).is_ok());
    }

    fn publish_presence(&mut self, delta: PresenceEvent) {
        self.fan_out(&ChannelMessage::Presence(delta));
        let sync = PresenceEvent::Sync(self.snapshot());
        self.fan_out(&ChannelMessage::Presence(sync));
    }
}

impl LocalHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members currently subscribed to `topic`.
    pub fn member_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|state| state.members.len())
            .unwrap_or(0)
    }
}

impl ChannelBackend for LocalHub {
    fn subscribe(
        &self,
        topic: &str,
        member_id: Uuid,
    ) -> BoxFuture<'static, ChannelResult<mpsc::UnboundedReceiver<ChannelMessage>>> {
        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut state = topics.entry(topic.clone()).or_default();
            // Re-subscribing replaces the previous connection: the old queue
            // is dropped, so messages sent mid-reconnect are lost.
            state.members.insert(
                member_id,
                MemberSlot {
                    record: None,
                    tx: tx.clone(),
                },
            );
            let sync = PresenceEvent::Sync(state.snapshot());
            let _ = tx.send(ChannelMessage::Presence(sync));
            debug!(%topic, %member_id, "member subscribed");
            Ok(rx)
        })
    }

    fn track(
        &self,
        topic: &str,
        member_id: Uuid,
        record: PresenceRecord,
    ) -> BoxFuture<'static, ChannelResult<()>> {
        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Box::pin(async move {
            let mut state = topics
                .get_mut(&topic)
                .ok_or_else(|| ChannelError::Connection(format!("unknown topic `{topic}`")))?;
            let slot = state
                .members
                .get_mut(&member_id)
                .ok_or_else(|| ChannelError::NotSubscribed(topic.clone()))?;
            slot.record = Some(record.clone());
            state.publish_presence(PresenceEvent::Join { member_id, record });
            Ok(())
        })
    }

    fn untrack(&self, topic: &str, member_id: Uuid) -> BoxFuture<'static, ChannelResult<()>> {
        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Box::pin(async move {
            let mut state = topics
                .get_mut(&topic)
                .ok_or_else(|| ChannelError::Connection(format!("unknown topic `{topic}`")))?;
            let slot = state
                .members
                .get_mut(&member_id)
                .ok_or_else(|| ChannelError::NotSubscribed(topic.clone()))?;
            if slot.record.take().is_some() {
                state.publish_presence(PresenceEvent::Leave { member_id });
            }
            Ok(())
        })
    }

    fn broadcast(&self, topic: &str, event: RoomEvent) -> BoxFuture<'static, ChannelResult<()>> {
        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Box::pin(async move {
            let mut state = topics
                .get_mut(&topic)
                .ok_or_else(|| ChannelError::Connection(format!("unknown topic `{topic}`")))?;
            debug!(%topic, event = event.name(), "broadcasting");
            state.fan_out(&ChannelMessage::Broadcast(event));
            Ok(())
        })
    }

    fn unsubscribe(&self, topic: &str, member_id: Uuid) -> BoxFuture<'static, ChannelResult<()>> {
        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Box::pin(async move {
            let mut emptied = false;
            if let Some(mut state) = topics.get_mut(&topic) {
                if let Some(slot) = state.members.shift_remove(&member_id) {
                    if slot.record.is_some() {
                        state.publish_presence(PresenceEvent::Leave { member_id });
                    }
                    debug!(%topic, %member_id, "member unsubscribed");
                }
                emptied = state.members.is_empty();
            }
            if emptied {
                topics.remove_if(&topic, |_, state| state.members.is_empty());
            }
            Ok(())
        })
    }
}
