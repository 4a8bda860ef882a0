//! Player-facing operations: joining a room, answering, readiness, and the
//! scoped teardown on leave.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    authority::{AnswerAuthority, AuthorityError, RoomCode, SubmittedAnswer},
    channel::{self, ChannelBackend, ChannelMessage},
    config::EngineConfig,
    dto::{events::RoomEvent, presence::PresenceRecord},
    error::{SyncError, SyncResult},
    state::{ParticipationEvent, ParticipationPhase, Role, RoomSession, SharedSession},
};

/// A session wired to its room topic, plus the inbound stream to feed into
/// [`event_service::drive`](crate::services::event_service::drive).
pub struct JoinedRoom {
    /// The client's session.
    pub session: SharedSession,
    /// Broadcasts and presence events for this member.
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
}

/// Subscribe to the room topic, publish the joining presence record, and
/// build the session. The player must already be registered with the
/// authority.
#[allow(clippy::too_many_arguments)]
pub async fn join_room(
    backend: Arc<dyn ChannelBackend>,
    authority: Arc<dyn AnswerAuthority>,
    config: EngineConfig,
    room_code: RoomCode,
    player_id: Uuid,
    display_name: &str,
    avatar_url: &str,
    role: Role,
) -> SyncResult<JoinedRoom> {
    let subscription = channel::subscribe(backend, room_code.as_str(), player_id).await?;
    let session = RoomSession::new(
        room_code,
        player_id,
        display_name,
        avatar_url,
        role,
        config,
        authority,
        subscription.handle,
    );
    session.apply_phase(ParticipationEvent::Joined).await?;
    session
        .handle()
        .track(PresenceRecord::joining(
            display_name,
            avatar_url,
            role.is_host(),
        ))
        .await?;
    info!(player = %player_id, room = %session.room_code(), "joined room");
    Ok(JoinedRoom {
        session,
        messages: subscription.messages,
    })
}

/// Submit this player's answer for the open round.
///
/// Single-use: a second call returns the original result without touching
/// the authority. The roster is updated optimistically; the next
/// QUESTION_END overwrites it with authoritative numbers.
pub async fn submit_answer(session: &SharedSession, answer: &str) -> SyncResult<SubmittedAnswer> {
    match session.phase() {
        ParticipationPhase::AnsweringRound => {}
        ParticipationPhase::Cancelled => return Err(SyncError::Cancelled),
        _ => {
            return Err(SyncError::InvalidState(
                "no question is open for answers".into(),
            ));
        }
    }
    let (question_id, elapsed_ms) = {
        let round = session.round().read().await;
        let round = round
            .as_ref()
            .ok_or_else(|| SyncError::InvalidState("no active round".into()))?;
        if let Some(original) = &round.answered {
            return Ok(original.clone());
        }
        if round.clock.is_expired() {
            return Err(SyncError::InvalidState("the round clock expired".into()));
        }
        (round.question.id, round.elapsed_ms())
    };

    let submitted = match session
        .authority()
        .submit_answer(
            session.room_code(),
            question_id,
            session.player_id(),
            answer.to_string(),
            elapsed_ms,
        )
        .await
    {
        Ok(submitted) => submitted,
        // The authority already holds an answer for this player; keep the
        // original award.
        Err(AuthorityError::AlreadyAnswered(original)) => original,
        Err(err) => return Err(err.into()),
    };

    {
        let mut round = session.round().write().await;
        if let Some(round) = round.as_mut() {
            round.answered = Some(submitted.clone());
        }
    }
    {
        let mut roster = session.roster().write().await;
        roster.mark_answered(session.player_id());
        roster.set_score(session.player_id(), submitted.new_total_score);
    }
    session.bump_roster();

    session
        .handle()
        .broadcast(RoomEvent::PlayerAnswered {
            player_id: session.player_id(),
            player_name: session.display_name().to_string(),
        })
        .await?;
    let record = session.presence_record().await;
    session.handle().track(record).await?;

    info!(
        player = %session.player_id(),
        correct = submitted.is_correct,
        points = submitted.points_earned,
        "answer recorded"
    );
    Ok(submitted)
}

/// Publish this player's lobby readiness.
pub async fn set_ready(session: &SharedSession, is_ready: bool) -> SyncResult<()> {
    let mut record = session.presence_record().await;
    record.is_ready = is_ready;
    session.handle().track(record).await?;
    Ok(())
}

/// Leave the room. Every teardown step runs even when an earlier one fails;
/// the first failure is reported once all of them ran.
pub async fn leave_room(session: &SharedSession) -> SyncResult<()> {
    {
        let mut round = session.round().write().await;
        if let Some(round) = round.take() {
            round.clock.freeze();
        }
    }

    let mut first_error: Option<SyncError> = None;
    if let Err(err) = session
        .handle()
        .broadcast(RoomEvent::PlayerLeft {
            player_id: session.player_id(),
        })
        .await
    {
        warn!(player = %session.player_id(), error = %err, "failed to announce departure");
        first_error.get_or_insert(err.into());
    }
    if let Err(err) = session.handle().untrack().await {
        warn!(player = %session.player_id(), error = %err, "failed to release presence");
        first_error.get_or_insert(err.into());
    }
    if let Err(err) = session.handle().unsubscribe().await {
        warn!(player = %session.player_id(), error = %err, "failed to unsubscribe");
        first_error.get_or_insert(err.into());
    }

    info!(player = %session.player_id(), room = %session.room_code(), "left room");
    match first_error {
        None => Ok(()),
        Some(err) => Err(err),
    }
}
