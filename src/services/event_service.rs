//! The event-handling core every client runs, host included: drains the
//! room topic and applies each message to the local session.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    channel::{ChannelMessage, PresenceEvent},
    dto::events::RoomEvent,
    state::{ParticipationEvent, SharedSession},
};

/// Drain `messages`, applying each one, until the stream closes or the
/// session reaches a terminal phase.
pub async fn drive(session: &SharedSession, messages: &mut mpsc::UnboundedReceiver<ChannelMessage>) {
    while let Some(message) = messages.recv().await {
        apply_message(session, message).await;
        if session.phase().is_terminal() {
            debug!(player = %session.player_id(), phase = ?session.phase(), "event loop finished");
            break;
        }
    }
}

/// Apply one inbound channel message to the session.
pub async fn apply_message(session: &SharedSession, message: ChannelMessage) {
    match message {
        ChannelMessage::Presence(event) => apply_presence(session, event).await,
        ChannelMessage::Broadcast(event) => apply_broadcast(session, event).await,
    }
}

async fn apply_presence(session: &SharedSession, event: PresenceEvent) {
    session.roster().write().await.apply_presence(event);
    session.bump_roster();
}

async fn apply_broadcast(session: &SharedSession, event: RoomEvent) {
    debug!(player = %session.player_id(), event = event.name(), "handling broadcast");
    match event {
        RoomEvent::GameStart { countdown_seconds } => {
            if apply_transition(session, ParticipationEvent::GameStarted).await {
                debug!(player = %session.player_id(), countdown_seconds, "countdown running");
            }
        }
        RoomEvent::Question {
            question,
            time_limit_seconds,
        } => {
            if !accept(session, ParticipationEvent::QuestionPosed).await {
                return;
            }
            // The host opened this round locally before broadcasting; keep
            // its clock instead of restarting one.
            let already_open = {
                let round = session.round().read().await;
                round
                    .as_ref()
                    .is_some_and(|round| round.question.id == question.id)
            };
            if !already_open {
                session.open_round(question, time_limit_seconds).await;
            }
            session.roster().write().await.reset_answered();
            session.bump_roster();
            // Republish so the hub's record for this member no longer
            // carries the previous round's answered flag.
            let record = session.presence_record().await;
            if let Err(err) = session.handle().track(record).await {
                warn!(player = %session.player_id(), error = %err, "presence republish failed");
            }
            apply_transition(session, ParticipationEvent::QuestionPosed).await;
        }
        RoomEvent::PlayerAnswered {
            player_id,
            player_name,
        } => {
            debug!(player = %player_id, name = %player_name, "player answered");
            session.roster().write().await.mark_answered(player_id);
            session.bump_roster();
        }
        RoomEvent::QuestionEnd { results } => {
            if !accept(session, ParticipationEvent::RoundEnded).await {
                return;
            }
            if let Some(round) = session.round().read().await.as_ref() {
                round.clock.freeze();
            }
            session.roster().write().await.apply_results(&results);
            session.bump_roster();
            *session.last_results().write().await = Some(results);
            apply_transition(session, ParticipationEvent::RoundEnded).await;
        }
        RoomEvent::GameEnd { final_scores } => {
            if !accept(session, ParticipationEvent::GameEnded).await {
                return;
            }
            if let Some(round) = session.round().read().await.as_ref() {
                round.clock.freeze();
            }
            *session.final_scores().write().await = Some(final_scores);
            apply_transition(session, ParticipationEvent::GameEnded).await;
        }
        RoomEvent::PlayerLeft { player_id } => {
            session.roster().write().await.remove(player_id);
            session.bump_roster();
        }
        RoomEvent::HostCancelled => {
            let _ = apply_transition(session, ParticipationEvent::HostCancelled).await;
            if let Some(round) = session.round().read().await.as_ref() {
                round.clock.freeze();
            }
        }
    }
}

/// Check whether a participation event is legal right now, logging and
/// swallowing out-of-phase broadcasts. Round-transition handlers install
/// their side effects between this check and [`apply_transition`], so a
/// watcher waking on the new phase always sees them in place.
async fn accept(session: &SharedSession, event: ParticipationEvent) -> bool {
    match session.peek_phase(event).await {
        Ok(_) => true,
        Err(err) => {
            warn!(player = %session.player_id(), error = %err, "ignoring out-of-phase event");
            false
        }
    }
}

/// Apply a participation event, logging and swallowing out-of-phase events.
async fn apply_transition(session: &SharedSession, event: ParticipationEvent) -> bool {
    match session.apply_phase(event).await {
        Ok(_) => true,
        Err(err) => {
            warn!(player = %session.player_id(), error = %err, "ignoring out-of-phase event");
            false
        }
    }
}
