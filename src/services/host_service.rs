//! Host-side authority driver: the one client per room that starts the
//! game, arbitrates round ends, and advances through the question list.

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    authority::{AuthorityError, StartedGame},
    dto::{
        events::RoomEvent,
        question::Question,
        results::{FinalScore, PlayerRoundResult, RoundResults},
    },
    error::{SyncError, SyncResult},
    state::SharedSession,
};

/// Outcome of advancing past a closed round.
#[derive(Debug)]
pub enum Advanced {
    /// The next question is now open.
    NextQuestion,
    /// No further questions; the game ended with this leaderboard.
    GameOver(Vec<FinalScore>),
    /// The room had already moved past the requested index.
    AlreadyAdvanced,
}

/// Start the game and broadcast GAME_START. Fails `NotHost`,
/// `AlreadyStarted`, or `NotEnoughPlayers` straight from the authority.
pub async fn start(session: &SharedSession) -> SyncResult<StartedGame> {
    ensure_host(session)?;
    let started = session
        .authority()
        .start_game(session.room_code(), session.player_id())
        .await?;
    session
        .handle()
        .broadcast(RoomEvent::GameStart {
            countdown_seconds: session.config().countdown_seconds,
        })
        .await?;
    info!(room = %session.room_code(), "game starting");
    Ok(started)
}

/// Drive an entire game: start, lobby countdown, then one round after
/// another until the question list runs out. Returns the final leaderboard.
pub async fn run_game(session: &SharedSession) -> SyncResult<Vec<FinalScore>> {
    let started = start(session).await?;
    sleep(session.config().countdown()).await;

    let time_limit = started.time_per_question;
    let mut next_index = started.first_question.index + 1;
    pose_question(session, &started.first_question, time_limit).await?;
    loop {
        run_round(session).await?;
        sleep(session.config().results_display()).await;
        match advance(session, next_index).await? {
            Advanced::NextQuestion | Advanced::AlreadyAdvanced => next_index += 1,
            Advanced::GameOver(final_scores) => return Ok(final_scores),
        }
    }
}

/// Wait out the open round, then close it. The round ends on whichever
/// fires first: the host's clock reaching zero, or every roster member
/// having answered.
pub async fn run_round(session: &SharedSession) -> SyncResult<()> {
    ensure_host(session)?;
    let (question_id, mut clock) = {
        let round = session.round().read().await;
        let round = round
            .as_ref()
            .ok_or_else(|| SyncError::InvalidState("no open round".into()))?;
        (round.question.id, round.clock.watcher())
    };
    let mut roster_changes = session.roster_watcher();

    loop {
        if session.roster().read().await.all_answered() {
            debug!(room = %session.room_code(), "closing round: everyone answered");
            break;
        }
        tokio::select! {
            expired = clock.wait_for(|left| *left == 0) => {
                let _ = expired;
                debug!(room = %session.room_code(), "closing round: clock expired");
                break;
            }
            changed = roster_changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    compute_and_broadcast_results(session, question_id).await?;
    Ok(())
}

/// Close `question_id` and broadcast QUESTION_END at most once. Returns
/// `false` when another caller holds the close claim or the round was
/// already resolved; nothing is sent in that case.
pub async fn compute_and_broadcast_results(
    session: &SharedSession,
    question_id: Uuid,
) -> SyncResult<bool> {
    ensure_host(session)?;
    if !session.begin_round_close() {
        return Ok(false);
    }
    let outcome = close_round(session, question_id).await;
    session.finish_round_close();
    outcome
}

async fn close_round(session: &SharedSession, question_id: Uuid) -> SyncResult<bool> {
    let closed = match session
        .authority()
        .close_question(session.room_code(), question_id)
        .await
    {
        Ok(closed) => closed,
        Err(AuthorityError::QuestionClosed) => {
            debug!(room = %session.room_code(), "round already resolved");
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };

    let results = RoundResults {
        question_id: closed.question.id,
        question_index: closed.question.index,
        question_text: closed.question.text,
        correct_answer: closed.question.correct_answer,
        explanation: closed.question.explanation,
        per_player: closed
            .answers
            .into_iter()
            .map(|entry| PlayerRoundResult {
                player_id: entry.player_id,
                name: entry.player_name,
                answer: entry.answer,
                is_correct: entry.is_correct,
                response_time_ms: entry.response_time_ms,
                points_earned: entry.points_earned,
                new_total_score: entry.total_score,
            })
            .collect(),
    };
    session
        .handle()
        .broadcast(RoomEvent::QuestionEnd { results })
        .await?;
    info!(room = %session.room_code(), index = closed.question.index, "round closed");
    Ok(true)
}

/// Open question `next_index`, or end the game when the list is exhausted.
/// Calling with an index the room has already passed is a silent no-op.
pub async fn advance(session: &SharedSession, next_index: usize) -> SyncResult<Advanced> {
    ensure_host(session)?;
    let time_limit = {
        let round = session.round().read().await;
        let round = round
            .as_ref()
            .ok_or_else(|| SyncError::InvalidState("no round has been posed yet".into()))?;
        if round.question.index >= next_index {
            return Ok(Advanced::AlreadyAdvanced);
        }
        round.time_limit_seconds
    };

    match session
        .authority()
        .question_at(session.room_code(), next_index)
        .await?
    {
        Some(question) => {
            pose_question(session, &question, time_limit).await?;
            Ok(Advanced::NextQuestion)
        }
        None => {
            let final_scores = session.authority().end_game(session.room_code()).await?;
            session
                .handle()
                .broadcast(RoomEvent::GameEnd {
                    final_scores: final_scores.clone(),
                })
                .await?;
            info!(room = %session.room_code(), "game over");
            Ok(Advanced::GameOver(final_scores))
        }
    }
}

/// Cancel the room: the registry first, then the terminal broadcast.
pub async fn cancel(session: &SharedSession) -> SyncResult<()> {
    ensure_host(session)?;
    session
        .authority()
        .cancel_game(session.room_code())
        .await?;
    session.handle().broadcast(RoomEvent::HostCancelled).await?;
    warn!(room = %session.room_code(), "room cancelled by host");
    Ok(())
}

/// Registry first, then the local round, then the broadcast, so the
/// authority accepts answers before any client can send one.
async fn pose_question(
    session: &SharedSession,
    question: &Question,
    time_limit_seconds: u32,
) -> SyncResult<()> {
    session
        .authority()
        .mark_question_shown(session.room_code(), question.index)
        .await?;
    session.open_round(question.view(), time_limit_seconds).await;
    session.roster().write().await.reset_answered();
    session.bump_roster();
    session
        .handle()
        .broadcast(RoomEvent::Question {
            question: question.view(),
            time_limit_seconds,
        })
        .await?;
    debug!(room = %session.room_code(), index = question.index, "question posed");
    Ok(())
}

fn ensure_host(session: &SharedSession) -> SyncResult<()> {
    if session.role().is_host() {
        Ok(())
    } else {
        Err(AuthorityError::NotHost.into())
    }
}
