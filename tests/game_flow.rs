//! End-to-end games played over the in-memory hub: a host and players in
//! one process, each with its own session and event loop.

use std::sync::Arc;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, Instant, sleep},
};
use uuid::Uuid;

use challenge_sync::{
    authority::{AnswerAuthority, AuthorityError, InMemoryAuthority, RoomCode, RoomStatus},
    channel::{self, ChannelBackend, ChannelMessage, LocalHub},
    config::EngineConfig,
    dto::{
        events::RoomEvent,
        question::{QuestionInput, QuestionPayload},
    },
    error::SyncError,
    services::{event_service, host_service, player_service},
    state::{ParticipationPhase, Role, SharedSession},
};

struct Room {
    hub: Arc<dyn ChannelBackend>,
    registry: Arc<InMemoryAuthority>,
    authority: Arc<dyn AnswerAuthority>,
    config: EngineConfig,
    code: RoomCode,
    host_id: Uuid,
}

impl Room {
    fn create(question_count: usize, time_per_question: u32) -> Self {
        let hub: Arc<dyn ChannelBackend> = Arc::new(LocalHub::new());
        let registry = Arc::new(InMemoryAuthority::new(2));
        let authority: Arc<dyn AnswerAuthority> = registry.clone();
        let host_id = Uuid::new_v4();
        let code = registry.create_room(
            host_id,
            "hana",
            questions(question_count),
            time_per_question,
        );
        Self {
            hub,
            registry,
            authority,
            config: EngineConfig::default(),
            code,
            host_id,
        }
    }

    async fn register(&self, name: &str) -> Uuid {
        let player_id = Uuid::new_v4();
        self.registry
            .register_player(&self.code, player_id, name)
            .await
            .unwrap();
        player_id
    }

    async fn join(
        &self,
        player_id: Uuid,
        name: &str,
        role: Role,
    ) -> (SharedSession, JoinHandle<()>) {
        let joined = player_service::join_room(
            Arc::clone(&self.hub),
            Arc::clone(&self.authority),
            self.config.clone(),
            self.code.clone(),
            player_id,
            name,
            "",
            role,
        )
        .await
        .unwrap();
        let session = joined.session;
        let mut messages = joined.messages;
        let driver = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { event_service::drive(&session, &mut messages).await })
        };
        (session, driver)
    }

    /// Silent subscriber recording every broadcast without tracking presence.
    async fn observe(&self) -> mpsc::UnboundedReceiver<ChannelMessage> {
        channel::subscribe(Arc::clone(&self.hub), self.code.as_str(), Uuid::new_v4())
            .await
            .unwrap()
            .messages
    }
}

fn questions(count: usize) -> Vec<QuestionInput> {
    (0..count)
        .map(|n| QuestionInput {
            text: format!("question {n}"),
            payload: QuestionPayload::TypeAnswer,
            correct_answer: "4".into(),
            explanation: None,
        })
        .collect()
}

/// Answer every question after a per-round think time until the room
/// reaches a terminal phase. `script[index]` is `(think_ms, answer)`.
async fn play(session: SharedSession, script: Vec<(u64, &'static str)>) {
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
                if let Some((think_ms, answer)) = script.get(index).copied() {
                    sleep(Duration::from_millis(think_ms)).await;
                    let _ = player_service::submit_answer(&session, answer).await;
                }
            }
        }
        if phases.changed().await.is_err() {
            break;
        }
    }
}

fn drain_broadcasts(messages: &mut mpsc::UnboundedReceiver<ChannelMessage>) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    while let Ok(message) = messages.try_recv() {
        if let ChannelMessage::Broadcast(event) = message {
            events.push(event);
        }
    }
    events
}

#[tokio::test(start_paused = true)]
async fn rounds_close_early_once_everyone_answered() {
    let room = Room::create(2, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;
    let mut observer = room.observe().await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    let (bob, _bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    tokio::spawn(play(Arc::clone(&host), vec![(1_000, "4"), (1_000, "4")]));
    tokio::spawn(play(Arc::clone(&alice), vec![(2_000, "4"), (2_000, "4")]));
    tokio::spawn(play(Arc::clone(&bob), vec![(3_000, "4"), (3_000, "4")]));
    sleep(Duration::from_millis(10)).await;

    {
        let roster = host.roster().read().await;
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.host_count(), 1);
    }

    let started = Instant::now();
    let final_scores = host_service::run_game(&host).await.unwrap();
    let elapsed = started.elapsed();

    // Both rounds close on the all-answered trigger at 3s, far short of the
    // 10s limit: 3s countdown + 2 * (3s round + 5s results display).
    assert!(elapsed < Duration::from_secs(25), "game took {elapsed:?}");

    assert_eq!(final_scores.len(), 3);
    assert_eq!(final_scores[0].name, "hana");
    assert_eq!(final_scores[0].total_score, 1_900);
    assert_eq!(final_scores[0].rank, 1);
    assert_eq!(final_scores[1].name, "alice");
    assert_eq!(final_scores[1].total_score, 1_800);
    assert_eq!(final_scores[2].name, "bob");
    assert_eq!(final_scores[2].total_score, 1_700);

    let events = drain_broadcasts(&mut observer);
    let closed_indices: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            RoomEvent::QuestionEnd { results } => Some(results.question_index),
            _ => None,
        })
        .collect();
    assert_eq!(closed_indices, vec![0, 1]);
    let game_ends = events
        .iter()
        .filter(|event| matches!(event, RoomEvent::GameEnd { .. }))
        .count();
    assert_eq!(game_ends, 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_players_are_charged_the_full_round() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;
    let mut observer = room.observe().await;

    let (host, host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    let (_bob, bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    tokio::spawn(play(Arc::clone(&host), vec![(1_000, "4")]));
    tokio::spawn(play(Arc::clone(&alice), vec![(2_000, "4")]));
    // Nobody plays for bob; the round has to run its clock down.

    let started = Instant::now();
    let final_scores = host_service::run_game(&host).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(13), "round closed early: {elapsed:?}");

    assert_eq!(final_scores.len(), 3);
    assert_eq!(final_scores[2].name, "bob");
    assert_eq!(final_scores[2].total_score, 0);
    assert_eq!(final_scores[2].rank, 3);

    host_driver.await.unwrap();
    let results = host.last_results().read().await;
    let results = results.as_ref().unwrap();
    let bob_entry = results
        .per_player
        .iter()
        .find(|entry| entry.player_id == bob_id)
        .unwrap();
    assert_eq!(bob_entry.answer, None);
    assert!(!bob_entry.is_correct);
    assert_eq!(bob_entry.points_earned, 0);
    assert_eq!(bob_entry.response_time_ms, 10_000);

    // The timeout and all-answered triggers never double-close a round.
    let events = drain_broadcasts(&mut observer);
    let question_ends = events
        .iter()
        .filter(|event| matches!(event, RoomEvent::QuestionEnd { .. }))
        .count();
    assert_eq!(question_ends, 1);

    bob_driver.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn equal_scores_rank_by_cumulative_response_time() {
    let room = Room::create(2, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    let (bob, _bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    // Both finish on 950 points; alice spent 2s answering overall, bob 4s.
    tokio::spawn(play(Arc::clone(&host), vec![(500, "4"), (500, "4")]));
    tokio::spawn(play(Arc::clone(&alice), vec![(1_000, "wrong"), (1_000, "4")]));
    tokio::spawn(play(Arc::clone(&bob), vec![(1_000, "4"), (3_000, "wrong")]));

    let final_scores = host_service::run_game(&host).await.unwrap();

    assert_eq!(final_scores[0].name, "hana");
    assert_eq!(final_scores[0].total_score, 1_950);
    assert_eq!(final_scores[1].name, "alice");
    assert_eq!(final_scores[1].total_score, 950);
    assert_eq!(final_scores[1].rank, 2);
    assert_eq!(final_scores[2].name, "bob");
    assert_eq!(final_scores[2].total_score, 950);
    assert_eq!(final_scores[2].rank, 3);
}

#[tokio::test(start_paused = true)]
async fn answers_after_the_round_closed_are_refused() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    let (bob, bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    tokio::spawn(play(Arc::clone(&host), vec![(1_000, "4")]));
    tokio::spawn(play(Arc::clone(&alice), vec![(2_000, "4")]));

    let game = {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host_service::run_game(&host).await })
    };

    let mut phases = bob.phase_watcher();
    phases
        .wait_for(|phase| *phase == ParticipationPhase::ResultsDisplay)
        .await
        .unwrap();

    let err = player_service::submit_answer(&bob, "4").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidState(_)), "got {err:?}");

    let question_id = {
        let round = bob.round().read().await;
        round.as_ref().unwrap().question.id
    };
    let err = room
        .authority
        .submit_answer(&room.code, question_id, bob_id, "4".into(), 500)
        .await
        .unwrap_err();
    assert_eq!(err, AuthorityError::QuestionClosed);

    let final_scores = game.await.unwrap().unwrap();
    assert_eq!(final_scores.len(), 3);
    bob_driver.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnecting_client_catches_up_and_cannot_answer_the_closed_round() {
    let room = Room::create(2, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    let (bob, _bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    tokio::spawn(play(Arc::clone(&host), vec![(1_000, "4"), (1_000, "4")]));
    tokio::spawn(play(Arc::clone(&alice), vec![(2_000, "4"), (2_000, "4")]));

    let game = {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host_service::run_game(&host).await })
    };

    // Bob drops out as soon as the first question opens.
    let mut alice_phases = alice.phase_watcher();
    alice_phases
        .wait_for(|phase| *phase == ParticipationPhase::AnsweringRound)
        .await
        .unwrap();
    player_service::leave_room(&bob).await.unwrap();

    // Rejoin while the second question is open. The fresh session missed
    // the QUESTION broadcast, so it waits in the lobby.
    alice_phases
        .wait_for(|phase| *phase == ParticipationPhase::ResultsDisplay)
        .await
        .unwrap();
    alice_phases
        .wait_for(|phase| *phase == ParticipationPhase::AnsweringRound)
        .await
        .unwrap();
    let (bob, bob_driver) = room.join(bob_id, "bob", Role::Player).await;
    assert_eq!(bob.phase(), ParticipationPhase::Lobby);

    // The round times out (bob is back on the roster without answering);
    // its QUESTION_END is the first broadcast that places bob in the game.
    let mut bob_phases = bob.phase_watcher();
    bob_phases
        .wait_for(|phase| *phase == ParticipationPhase::ResultsDisplay)
        .await
        .unwrap();

    let err = player_service::submit_answer(&bob, "4").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidState(_)), "got {err:?}");

    let closed_question_id = {
        let round = alice.round().read().await;
        round.as_ref().unwrap().question.id
    };
    let err = room
        .authority
        .submit_answer(&room.code, closed_question_id, bob_id, "4".into(), 500)
        .await
        .unwrap_err();
    assert_eq!(err, AuthorityError::QuestionClosed);

    let final_scores = game.await.unwrap().unwrap();
    assert_eq!(final_scores.len(), 3);
    bob_driver.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn question_end_is_broadcast_exactly_once() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;
    let mut observer = room.observe().await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (_alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;

    let started = host_service::start(&host).await.unwrap();
    room.authority
        .mark_question_shown(&room.code, 0)
        .await
        .unwrap();
    host.open_round(started.first_question.view(), started.time_per_question)
        .await;

    let question_id = started.first_question.id;
    let (first, second) = tokio::join!(
        host_service::compute_and_broadcast_results(&host, question_id),
        host_service::compute_and_broadcast_results(&host, question_id),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(first ^ second, "exactly one close must win");

    let events = drain_broadcasts(&mut observer);
    let question_ends = events
        .iter()
        .filter(|event| matches!(event, RoomEvent::QuestionEnd { .. }))
        .count();
    assert_eq!(question_ends, 1);
}

#[tokio::test(start_paused = true)]
async fn second_submission_returns_the_original_result() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;
    let bob_id = room.register("bob").await;

    let (host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;
    // Bob keeps the round open so the close cannot race the retry.
    let (_bob, _bob_driver) = room.join(bob_id, "bob", Role::Player).await;

    tokio::spawn(play(Arc::clone(&host), vec![(500, "4")]));

    let game = {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host_service::run_game(&host).await })
    };

    let mut phases = alice.phase_watcher();
    phases
        .wait_for(|phase| *phase == ParticipationPhase::AnsweringRound)
        .await
        .unwrap();
    sleep(Duration::from_millis(1_000)).await;

    let first = player_service::submit_answer(&alice, "4").await.unwrap();
    assert!(first.is_correct);
    assert_eq!(first.points_earned, 950);

    let second = player_service::submit_answer(&alice, "nonsense").await.unwrap();
    assert_eq!(second, first);

    let final_scores = game.await.unwrap().unwrap();
    let alice_final = final_scores
        .iter()
        .find(|score| score.player_id == alice_id)
        .unwrap();
    assert_eq!(alice_final.total_score, 950);
}

#[tokio::test(start_paused = true)]
async fn cancellation_reaches_every_member() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;

    let (host, host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, alice_driver) = room.join(alice_id, "alice", Role::Player).await;

    host_service::cancel(&host).await.unwrap();

    let mut phases = alice.phase_watcher();
    phases
        .wait_for(|phase| *phase == ParticipationPhase::Cancelled)
        .await
        .unwrap();

    let err = player_service::submit_answer(&alice, "4").await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled), "got {err:?}");

    let status = room.registry.room_status(&room.code).await.unwrap();
    assert_eq!(status, RoomStatus::Cancelled);

    host_driver.await.unwrap();
    alice_driver.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn only_the_host_can_drive_rounds() {
    let room = Room::create(1, 10);
    let alice_id = room.register("alice").await;

    let (_host, _host_driver) = room.join(room.host_id, "hana", Role::Host).await;
    let (alice, _alice_driver) = room.join(alice_id, "alice", Role::Player).await;

    let err = host_service::start(&alice).await.unwrap_err();
    assert!(
        matches!(err, SyncError::Authority(AuthorityError::NotHost)),
        "got {err:?}"
    );
    let err = host_service::cancel(&alice).await.unwrap_err();
    assert!(matches!(err, SyncError::Authority(AuthorityError::NotHost)));
}
