//! Per-client session state: participation phase, roster view, and the
//! active round. One [`RoomSession`] per simulated client; no process-wide
//! singletons.

pub mod clock;
pub mod participation;
pub mod roster;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    sync::{Mutex, RwLock, watch},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    authority::{AnswerAuthority, RoomCode, SubmittedAnswer},
    channel::TopicHandle,
    config::EngineConfig,
    dto::{
        presence::PresenceRecord,
        question::QuestionView,
        results::{FinalScore, RoundResults},
    },
};

pub use self::clock::RoundClock;
pub use self::participation::{
    InvalidTransition, ParticipationEvent, ParticipationMachine, ParticipationPhase,
};
pub use self::roster::Roster;

/// Shared handle to one client's session.
pub type SharedSession = Arc<RoomSession>;

/// Whether this client additionally runs the authority state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sole sender of round-transition broadcasts.
    Host,
    /// Ordinary participant.
    Player,
}

impl Role {
    /// Whether this is the host role.
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// The question currently on this client's screen, with its local clock.
pub struct ActiveRound {
    /// The posed question, solution stripped.
    pub question: QuestionView,
    /// Seconds this round counts down from.
    pub time_limit_seconds: u32,
    /// Local countdown for the round.
    pub clock: RoundClock,
    /// When the question appeared on this client.
    pub asked_at: Instant,
    /// Single-use submit latch carrying the authoritative result.
    pub answered: Option<SubmittedAnswer>,
}

impl ActiveRound {
    fn open(question: QuestionView, time_limit_seconds: u32) -> Self {
        Self {
            question,
            time_limit_seconds,
            clock: RoundClock::start(time_limit_seconds),
            asked_at: Instant::now(),
            answered: None,
        }
    }

    /// Milliseconds elapsed since the question appeared.
    pub fn elapsed_ms(&self) -> u64 {
        self.asked_at.elapsed().as_millis() as u64
    }
}

/// One client's complete view of a room.
///
/// Everything a service touches hangs off this type; coordination with other
/// clients happens only through the channel and the answer authority.
pub struct RoomSession {
    room_code: RoomCode,
    player_id: Uuid,
    display_name: String,
    avatar_url: String,
    role: Role,
    config: EngineConfig,
    authority: Arc<dyn AnswerAuthority>,
    handle: TopicHandle,
    machine: Mutex<ParticipationMachine>,
    phase: watch::Sender<ParticipationPhase>,
    roster: RwLock<Roster>,
    roster_version: watch::Sender<u64>,
    round: RwLock<Option<ActiveRound>>,
    round_closing: AtomicBool,
    last_results: RwLock<Option<RoundResults>>,
    final_scores: RwLock<Option<Vec<FinalScore>>>,
}

impl RoomSession {
    /// Build a session for one client already subscribed to its room topic.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_code: RoomCode,
        player_id: Uuid,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
        role: Role,
        config: EngineConfig,
        authority: Arc<dyn AnswerAuthority>,
        handle: TopicHandle,
    ) -> SharedSession {
        let (phase_tx, _rx) = watch::channel(ParticipationPhase::Idle);
        let (roster_tx, _rx) = watch::channel(0);
        Arc::new(Self {
            room_code,
            player_id,
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
            role,
            config,
            authority,
            handle,
            machine: Mutex::new(ParticipationMachine::new()),
            phase: phase_tx,
            roster: RwLock::new(Roster::new()),
            roster_version: roster_tx,
            round: RwLock::new(None),
            round_closing: AtomicBool::new(false),
            last_results: RwLock::new(None),
            final_scores: RwLock::new(None),
        })
    }

    /// Code of the room this session belongs to.
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// Identifier of this client's player.
    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    /// Display name this client registered with.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// This client's role in the room.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Engine configuration this session runs under.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the answer authority.
    pub fn authority(&self) -> &Arc<dyn AnswerAuthority> {
        &self.authority
    }

    /// Handle to this member's room topic.
    pub fn handle(&self) -> &TopicHandle {
        &self.handle
    }

    /// Current participation phase.
    pub fn phase(&self) -> ParticipationPhase {
        *self.phase.borrow()
    }

    /// Watcher over participation phase changes.
    pub fn phase_watcher(&self) -> watch::Receiver<ParticipationPhase> {
        self.phase.subscribe()
    }

    /// Apply one participation event, publishing the new phase to watchers.
    pub async fn apply_phase(
        &self,
        event: ParticipationEvent,
    ) -> Result<ParticipationPhase, InvalidTransition> {
        let mut machine = self.machine.lock().await;
        let next = machine.apply(event)?;
        self.phase.send_replace(next);
        Ok(next)
    }

    /// Check where `event` would land without applying it. The event loop
    /// uses this to validate a broadcast before installing its side
    /// effects, publishing the phase only once those are visible.
    pub async fn peek_phase(
        &self,
        event: ParticipationEvent,
    ) -> Result<ParticipationPhase, InvalidTransition> {
        self.machine.lock().await.peek(event)
    }

    /// Local roster view.
    pub fn roster(&self) -> &RwLock<Roster> {
        &self.roster
    }

    /// Signal roster watchers that the roster changed.
    pub fn bump_roster(&self) {
        self.roster_version.send_modify(|version| *version += 1);
    }

    /// Watcher fired on every roster mutation.
    pub fn roster_watcher(&self) -> watch::Receiver<u64> {
        self.roster_version.subscribe()
    }

    /// The round currently on screen, if any.
    pub fn round(&self) -> &RwLock<Option<ActiveRound>> {
        &self.round
    }

    /// Replace the active round with a freshly opened one.
    pub async fn open_round(&self, question: QuestionView, time_limit_seconds: u32) {
        let mut round = self.round.write().await;
        *round = Some(ActiveRound::open(question, time_limit_seconds));
    }

    /// Claim the right to close the current round. At most one caller wins
    /// between matching [`finish_round_close`](Self::finish_round_close)
    /// calls.
    pub fn begin_round_close(&self) -> bool {
        self.round_closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the round-close claim.
    pub fn finish_round_close(&self) {
        self.round_closing.store(false, Ordering::Release);
    }

    /// Results of the most recently closed round.
    pub fn last_results(&self) -> &RwLock<Option<RoundResults>> {
        &self.last_results
    }

    /// Final leaderboard, present once GAME_END arrived.
    pub fn final_scores(&self) -> &RwLock<Option<Vec<FinalScore>>> {
        &self.final_scores
    }

    /// Assemble the presence record this member publishes right now,
    /// carrying its provisional answered flag and score.
    pub async fn presence_record(&self) -> PresenceRecord {
        let roster = self.roster.read().await;
        let current = roster.get(self.player_id);
        PresenceRecord {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            is_ready: current.map(|record| record.is_ready).unwrap_or(false),
            is_host: self.role.is_host(),
            has_answered: current.map(|record| record.has_answered).unwrap_or(false),
            score: current.map(|record| record.score).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        authority::InMemoryAuthority,
        channel::{ChannelBackend, LocalHub, subscribe},
    };

    async fn session() -> SharedSession {
        let hub: Arc<dyn ChannelBackend> = Arc::new(LocalHub::new());
        let player_id = Uuid::new_v4();
        let sub = subscribe(Arc::clone(&hub), "ROOM", player_id).await.unwrap();
        RoomSession::new(
            RoomCode::from("ROOM"),
            player_id,
            "alice",
            "",
            Role::Player,
            EngineConfig::default(),
            Arc::new(InMemoryAuthority::new(2)),
            sub.handle,
        )
    }

    #[tokio::test]
    async fn phase_changes_reach_watchers() {
        let session = session().await;
        let mut watcher = session.phase_watcher();
        assert_eq!(session.phase(), ParticipationPhase::Idle);

        session
            .apply_phase(ParticipationEvent::Joined)
            .await
            .unwrap();
        watcher
            .wait_for(|phase| *phase == ParticipationPhase::Lobby)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn round_close_claim_is_single_flight() {
        let session = session().await;
        assert!(session.begin_round_close());
        assert!(!session.begin_round_close());

        session.finish_round_close();
        assert!(session.begin_round_close());
    }

    #[tokio::test(start_paused = true)]
    async fn open_round_resets_the_latch_and_clock() {
        use crate::dto::question::{QuestionPayload, QuestionView};

        let session = session().await;
        let view = QuestionView {
            id: Uuid::new_v4(),
            index: 0,
            text: "2 + 2?".into(),
            payload: QuestionPayload::TypeAnswer,
        };
        session.open_round(view, 10).await;

        let round = session.round().read().await;
        let round = round.as_ref().unwrap();
        assert!(round.answered.is_none());
        assert_eq!(round.clock.remaining(), 10);
        assert_eq!(round.elapsed_ms(), 0);
    }
}
