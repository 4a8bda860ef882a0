//! Demo binary: one process simulating a host and two players playing a
//! short game over the in-memory hub and answer authority.

use std::sync::Arc;

use anyhow::Context;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use challenge_sync::{
    authority::{AnswerAuthority, InMemoryAuthority},
    channel::{ChannelBackend, LocalHub},
    config::EngineConfig,
    dto::question::{QuestionInput, QuestionPayload},
    services::{event_service, host_service, player_service},
    state::{ParticipationPhase, Role, SharedSession},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = EngineConfig::load();
    let hub: Arc<dyn ChannelBackend> = Arc::new(LocalHub::new());
    let registry = Arc::new(InMemoryAuthority::new(config.min_players));
    let authority: Arc<dyn AnswerAuthority> = registry.clone();

    let host_id = Uuid::new_v4();
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();

    let room_code = registry.create_room(host_id, "hana", demo_questions(), 10);
    info!(room = %room_code, "room open");
    registry
        .register_player(&room_code, alice_id, "alice")
        .await
        .context("registering alice")?;
    registry
        .register_player(&room_code, bob_id, "bob")
        .await
        .context("registering bob")?;

    let mut clients = Vec::new();
    for (player_id, name, role, think_ms, answers) in [
        (host_id, "hana", Role::Host, 2_300, vec!["4", "Paris", "Mars"]),
        (alice_id, "alice", Role::Player, 800, vec!["4", "Paris", "Mars"]),
        (bob_id, "bob", Role::Player, 1_500, vec!["5", "Paris", "Mars"]),
    ] {
        let joined = player_service::join_room(
            Arc::clone(&hub),
            Arc::clone(&authority),
            config.clone(),
            room_code.clone(),
            player_id,
            name,
            "",
            role,
        )
        .await
        .with_context(|| format!("joining as {name}"))?;

        let session = joined.session;
        let mut messages = joined.messages;
        let event_loop = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { event_service::drive(&session, &mut messages).await })
        };
        let play_loop = tokio::spawn(play(Arc::clone(&session), think_ms, answers));
        clients.push((session, event_loop, play_loop));
    }

    // Give readiness publishes a moment to fan out before starting.
    sleep(Duration::from_millis(200)).await;

    let host_session = Arc::clone(&clients[0].0);
    let final_scores = host_service::run_game(&host_session)
        .await
        .context("running the game")?;
    for score in &final_scores {
        info!(rank = score.rank, name = %score.name, points = score.total_score, "leaderboard");
    }

    for (session, event_loop, play_loop) in clients {
        let _ = play_loop.await;
        let _ = event_loop.await;
        if let Err(err) = player_service::leave_room(&session).await {
            warn!(player = %session.player_id(), error = %err, "teardown incomplete");
        }
    }

    Ok(())
}

/// One simulated participant: ready up, then answer each question after a
/// fixed think time until the room reaches a terminal phase.
async fn play(session: SharedSession, think_ms: u64, answers: Vec<&'static str>) {
    if let Err(err) = player_service::set_ready(&session, true).await {
        warn!(player = %session.player_id(), error = %err, "readiness publish failed");
    }

    let mut phases = session.phase_watcher();
    loop {
        let phase = *phases.borrow_and_update();
        if phase.is_terminal() {
            break;
        }
        if phase == ParticipationPhase::AnsweringRound {
            let index = {
                let round = session.round().read().await;
                round.as_ref().map(|round| round.question.index)
            };
            if let Some(index) = index {
                sleep(Duration::from_millis(think_ms)).await;
                let answer = answers.get(index).copied().unwrap_or("");
                if let Err(err) = player_service::submit_answer(&session, answer).await {
                    warn!(player = %session.player_id(), error = %err, "submit failed");
                }
            }
        }
        if phases.changed().await.is_err() {
            break;
        }
    }
}

fn demo_questions() -> Vec<QuestionInput> {
    vec![
        QuestionInput {
            text: "What is 2 + 2?".into(),
            payload: QuestionPayload::MultipleChoice {
                options: vec!["3".into(), "4".into(), "5".into()],
            },
            correct_answer: "4".into(),
            explanation: None,
        },
        QuestionInput {
            text: "Capital of France?".into(),
            payload: QuestionPayload::TypeAnswer,
            correct_answer: "Paris".into(),
            explanation: Some("Paris has been the capital since 987.".into()),
        },
        QuestionInput {
            text: "Which planet is known as the red planet?".into(),
            payload: QuestionPayload::MultipleChoice {
                options: vec!["Venus".into(), "Mars".into(), "Jupiter".into()],
            },
            correct_answer: "Mars".into(),
            explanation: None,
        },
    ]
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
