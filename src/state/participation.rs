use thiserror::Error;

/// Phases a client moves through over the life of one room.
///
/// `GameOver` and `Cancelled` are terminal; no event leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationPhase {
    /// Not yet in any room.
    Idle,
    /// Subscribed to the room topic, waiting for the host to start.
    Lobby,
    /// GAME_START received; the local countdown is running.
    Countdown,
    /// A question is on screen and the round clock is ticking.
    AnsweringRound,
    /// QUESTION_END received; round results are on display.
    ResultsDisplay,
    /// GAME_END received; the final leaderboard is on display.
    GameOver,
    /// HOST_CANCELLED received. Nothing in the room is retryable.
    Cancelled,
}

impl ParticipationPhase {
    /// Whether the phase accepts no further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GameOver | Self::Cancelled)
    }
}

/// Events that drive the participation machine. Each maps to one broadcast
/// (or to the local join).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationEvent {
    /// The client joined a room and subscribed to its topic.
    Joined,
    /// GAME_START broadcast.
    GameStarted,
    /// QUESTION broadcast.
    QuestionPosed,
    /// QUESTION_END broadcast.
    RoundEnded,
    /// GAME_END broadcast.
    GameEnded,
    /// HOST_CANCELLED broadcast.
    HostCancelled,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event arrived.
    pub from: ParticipationPhase,
    /// The event that cannot be applied from this phase.
    pub event: ParticipationEvent,
}

/// Pure transition table for one client's participation in a room.
///
/// Event application (clock control, roster updates, broadcasts) lives in
/// the service layer; this type only answers "is this move legal, and where
/// does it land".
#[derive(Debug, Clone)]
pub struct ParticipationMachine {
    phase: ParticipationPhase,
    version: usize,
}

impl Default for ParticipationMachine {
    fn default() -> Self {
        Self {
            phase: ParticipationPhase::Idle,
            version: 0,
        }
    }
}

impl ParticipationMachine {
    /// Create a machine in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> ParticipationPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply `event`, returning the phase it lands in.
    pub fn apply(&mut self, event: ParticipationEvent) -> Result<ParticipationPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Check where `event` would land without applying it.
    pub fn peek(&self, event: ParticipationEvent) -> Result<ParticipationPhase, InvalidTransition> {
        self.compute_transition(event)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(
        &self,
        event: ParticipationEvent,
    ) -> Result<ParticipationPhase, InvalidTransition> {
        use ParticipationEvent as E;
        use ParticipationPhase as P;

        let next = match (self.phase, event) {
            (P::Idle, E::Joined) => P::Lobby,
            (P::Lobby, E::GameStarted) => P::Countdown,
            (P::Countdown, E::QuestionPosed) => P::AnsweringRound,
            (P::AnsweringRound, E::RoundEnded) => P::ResultsDisplay,
            (P::ResultsDisplay, E::QuestionPosed) => P::AnsweringRound,
            (P::ResultsDisplay, E::GameEnded) => P::GameOver,
            // A client that joined mid-game sits in Lobby until the next
            // broadcast tells it where the room actually is.
            (P::Lobby, E::QuestionPosed) => P::AnsweringRound,
            (P::Lobby, E::RoundEnded) => P::ResultsDisplay,
            (P::Lobby, E::GameEnded) => P::GameOver,
            (from, E::HostCancelled) if !from.is_terminal() => P::Cancelled,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(machine: &mut ParticipationMachine, event: ParticipationEvent) -> ParticipationPhase {
        machine.apply(event).unwrap()
    }

    #[test]
    fn initial_phase_is_idle() {
        let machine = ParticipationMachine::new();
        assert_eq!(machine.phase(), ParticipationPhase::Idle);
    }

    #[test]
    fn full_happy_path_through_two_rounds() {
        let mut machine = ParticipationMachine::new();

        assert_eq!(
            apply(&mut machine, ParticipationEvent::Joined),
            ParticipationPhase::Lobby
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::GameStarted),
            ParticipationPhase::Countdown
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::QuestionPosed),
            ParticipationPhase::AnsweringRound
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::RoundEnded),
            ParticipationPhase::ResultsDisplay
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::QuestionPosed),
            ParticipationPhase::AnsweringRound
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::RoundEnded),
            ParticipationPhase::ResultsDisplay
        );
        assert_eq!(
            apply(&mut machine, ParticipationEvent::GameEnded),
            ParticipationPhase::GameOver
        );
    }

    #[test]
    fn rejoining_client_catches_up_from_lobby() {
        let mut machine = ParticipationMachine::new();
        apply(&mut machine, ParticipationEvent::Joined);

        assert_eq!(
            apply(&mut machine, ParticipationEvent::RoundEnded),
            ParticipationPhase::ResultsDisplay
        );
    }

    #[test]
    fn cancel_is_reachable_from_every_live_phase() {
        for events in [
            vec![],
            vec![ParticipationEvent::Joined],
            vec![ParticipationEvent::Joined, ParticipationEvent::GameStarted],
            vec![
                ParticipationEvent::Joined,
                ParticipationEvent::GameStarted,
                ParticipationEvent::QuestionPosed,
            ],
        ] {
            let mut machine = ParticipationMachine::new();
            for event in events {
                apply(&mut machine, event);
            }
            assert_eq!(
                apply(&mut machine, ParticipationEvent::HostCancelled),
                ParticipationPhase::Cancelled
            );
        }
    }

    #[test]
    fn terminal_phases_reject_everything() {
        let mut machine = ParticipationMachine::new();
        apply(&mut machine, ParticipationEvent::Joined);
        apply(&mut machine, ParticipationEvent::HostCancelled);

        let err = machine.apply(ParticipationEvent::QuestionPosed).unwrap_err();
        assert_eq!(err.from, ParticipationPhase::Cancelled);
        assert_eq!(err.event, ParticipationEvent::QuestionPosed);

        let err = machine.apply(ParticipationEvent::HostCancelled).unwrap_err();
        assert_eq!(err.from, ParticipationPhase::Cancelled);
    }

    #[test]
    fn question_before_start_is_invalid_from_countdown_only_path() {
        let mut machine = ParticipationMachine::new();
        let err = machine.apply(ParticipationEvent::RoundEnded).unwrap_err();
        match err {
            InvalidTransition {
                from: ParticipationPhase::Idle,
                event: ParticipationEvent::RoundEnded,
            } => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn version_counts_applied_transitions() {
        let mut machine = ParticipationMachine::new();
        assert_eq!(machine.version(), 0);
        apply(&mut machine, ParticipationEvent::Joined);
        apply(&mut machine, ParticipationEvent::GameStarted);
        assert_eq!(machine.version(), 2);

        let _ = machine.apply(ParticipationEvent::GameEnded);
        assert_eq!(machine.version(), 2);
    }
}
