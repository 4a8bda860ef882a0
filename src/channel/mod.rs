//! Pub/sub channel contract: one topic per room, member presence, and
//! at-most-once broadcast to currently-connected subscribers.

pub mod hub;

use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dto::{events::RoomEvent, presence::PresenceRecord};

pub use self::hub::LocalHub;

/// Result alias for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error raised by channel backends regardless of the underlying transport.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The channel is unreachable. Surfaced to the caller; never retried
    /// inside the core.
    #[error("channel unreachable: {0}")]
    Connection(String),
    /// The member is not subscribed to the topic it tried to use.
    #[error("not subscribed to topic `{0}`")]
    NotSubscribed(String),
}

/// Everything a subscriber can receive from its topic.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    /// A broadcast event from some member of the topic, the subscriber
    /// included.
    Broadcast(RoomEvent),
    /// A presence change on the topic.
    Presence(PresenceEvent),
}

/// Presence stream events.
///
/// `Sync` carries the full current member set and is authoritative; `Join`
/// and `Leave` are incremental hints only, never the reverse.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// Full snapshot of every tracked member, in join order.
    Sync(IndexMap<Uuid, PresenceRecord>),
    /// A member started tracking presence, or replaced its record.
    Join {
        /// Identifier of the member.
        member_id: Uuid,
        /// The record the member published.
        record: PresenceRecord,
    },
    /// A member stopped tracking presence or disconnected.
    Leave {
        /// Identifier of the member.
        member_id: Uuid,
    },
}

/// Abstraction over the pub/sub transport for room topics.
pub trait ChannelBackend: Send + Sync {
    /// Register `member_id` on `topic` and return its message stream. The
    /// first message delivered is a presence `Sync` snapshot.
    fn subscribe(
        &self,
        topic: &str,
        member_id: Uuid,
    ) -> BoxFuture<'static, ChannelResult<mpsc::UnboundedReceiver<ChannelMessage>>>;

    /// Idempotent upsert of this member's presence record. Replaces the prior
    /// record entirely.
    fn track(
        &self,
        topic: &str,
        member_id: Uuid,
        record: PresenceRecord,
    ) -> BoxFuture<'static, ChannelResult<()>>;

    /// Remove this member's presence record while staying subscribed.
    fn untrack(&self, topic: &str, member_id: Uuid) -> BoxFuture<'static, ChannelResult<()>>;

    /// Deliver `event` to every currently-connected subscriber of `topic`,
    /// the sender included. At-most-once; FIFO per sender only.
    fn broadcast(&self, topic: &str, event: RoomEvent) -> BoxFuture<'static, ChannelResult<()>>;

    /// Drop the member from the topic, releasing its presence entry.
    fn unsubscribe(&self, topic: &str, member_id: Uuid) -> BoxFuture<'static, ChannelResult<()>>;
}

/// Cloneable per-member handle to one topic.
#[derive(Clone)]
pub struct TopicHandle {
    backend: Arc<dyn ChannelBackend>,
    topic: String,
    member_id: Uuid,
}

impl TopicHandle {
    /// Identifier of the member this handle acts as.
    pub fn member_id(&self) -> Uuid {
        self.member_id
    }

    /// Topic this handle is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish or replace this member's presence record.
    pub async fn track(&self, record: PresenceRecord) -> ChannelResult<()> {
        self.backend.track(&self.topic, self.member_id, record).await
    }

    /// Remove this member's presence record.
    pub async fn untrack(&self) -> ChannelResult<()> {
        self.backend.untrack(&self.topic, self.member_id).await
    }

    /// Broadcast an event to every current subscriber of the topic.
    pub async fn broadcast(&self, event: RoomEvent) -> ChannelResult<()> {
        self.backend.broadcast(&self.topic, event).await
    }

    /// Leave the topic. Must run on every exit path so no orphaned presence
    /// entry survives the member.
    pub async fn unsubscribe(&self) -> ChannelResult<()> {
        self.backend.unsubscribe(&self.topic, self.member_id).await
    }
}

/// A live membership on one topic: the operations handle plus the inbound
/// message stream.
pub struct Subscription {
    /// Handle used to track presence, broadcast, and unsubscribe.
    pub handle: TopicHandle,
    /// Stream of broadcasts and presence events for this member.
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
}

/// Subscribe `member_id` to `topic` on the given backend.
pub async fn subscribe(
    backend: Arc<dyn ChannelBackend>,
    topic: &str,
    member_id: Uuid,
) -> ChannelResult<Subscription> {
    let messages = backend.subscribe(topic, member_id).await?;
    Ok(Subscription {
        handle: TopicHandle {
            backend,
            topic: topic.to_string(),
            member_id,
        },
        messages,
    })
}
