use indexmap::IndexMap;
use uuid::Uuid;

use crate::{channel::PresenceEvent, dto::presence::PresenceRecord, dto::results::RoundResults};

/// Local view of the room's members, in join order.
///
/// Presence `Sync` snapshots rebuild the roster from scratch; `Join` and
/// `Leave` deltas are applied incrementally. Scores and answered flags held
/// here are provisional between broadcasts and are overwritten wholesale by
/// every QUESTION_END.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: IndexMap<Uuid, PresenceRecord>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one presence event from the channel.
    pub fn apply_presence(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::Sync(snapshot) => self.members = snapshot,
            PresenceEvent::Join { member_id, record } => {
                self.members.insert(member_id, record);
            }
            PresenceEvent::Leave { member_id } => {
                self.members.shift_remove(&member_id);
            }
        }
    }

    /// Remove a member, as signalled by a PLAYER_LEFT broadcast.
    pub fn remove(&mut self, member_id: Uuid) {
        self.members.shift_remove(&member_id);
    }

    /// Flip one member's answered flag, ahead of the next presence sync.
    pub fn mark_answered(&mut self, member_id: Uuid) {
        if let Some(record) = self.members.get_mut(&member_id) {
            record.has_answered = true;
        }
    }

    /// Clear every answered flag. Runs on each QUESTION broadcast.
    pub fn reset_answered(&mut self) {
        for record in self.members.values_mut() {
            record.has_answered = false;
        }
    }

    /// Provisionally set one member's score, ahead of the next QUESTION_END.
    pub fn set_score(&mut self, member_id: Uuid, score: u32) {
        if let Some(record) = self.members.get_mut(&member_id) {
            record.score = score;
        }
    }

    /// Overwrite scores from authoritative round results. Entries for
    /// members no longer present are ignored.
    pub fn apply_results(&mut self, results: &RoundResults) {
        for entry in &results.per_player {
            if let Some(record) = self.members.get_mut(&entry.player_id) {
                record.score = entry.new_total_score;
            }
        }
    }

    /// Whether every current member has answered. `false` for an empty
    /// roster, so a room nobody tracks yet never closes a round early.
    pub fn all_answered(&self) -> bool {
        !self.members.is_empty() && self.members.values().all(|record| record.has_answered)
    }

    /// Number of members with `is_host` set.
    pub fn host_count(&self) -> usize {
        self.members.values().filter(|record| record.is_host).count()
    }

    /// Look up one member's record.
    pub fn get(&self, member_id: Uuid) -> Option<&PresenceRecord> {
        self.members.get(&member_id)
    }

    /// Members in join order.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &PresenceRecord)> {
        self.members.iter().map(|(id, record)| (*id, record))
    }

    /// Number of members currently tracked.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, is_host: bool) -> PresenceRecord {
        PresenceRecord::joining(name, "", is_host)
    }

    fn snapshot(entries: &[(Uuid, PresenceRecord)]) -> IndexMap<Uuid, PresenceRecord> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn sync_rebuilds_instead_of_merging() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut roster = Roster::new();
        roster.apply_presence(PresenceEvent::Join {
            member_id: alice,
            record: record("alice", true),
        });
        roster.mark_answered(alice);

        roster.apply_presence(PresenceEvent::Sync(snapshot(&[(
            bob,
            record("bob", false),
        )])));

        assert_eq!(roster.len(), 1);
        assert!(roster.get(alice).is_none());
        assert!(!roster.get(bob).unwrap().has_answered);
    }

    #[test]
    fn join_and_leave_deltas_apply_incrementally() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut roster = Roster::new();
        roster.apply_presence(PresenceEvent::Join {
            member_id: alice,
            record: record("alice", true),
        });
        roster.apply_presence(PresenceEvent::Join {
            member_id: bob,
            record: record("bob", false),
        });
        assert_eq!(roster.len(), 2);

        roster.apply_presence(PresenceEvent::Leave { member_id: alice });
        assert_eq!(roster.len(), 1);
        assert!(roster.get(bob).is_some());
    }

    #[test]
    fn all_answered_requires_every_member() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut roster = Roster::new();
        assert!(!roster.all_answered());

        roster.apply_presence(PresenceEvent::Sync(snapshot(&[
            (alice, record("alice", true)),
            (bob, record("bob", false)),
        ])));

        roster.mark_answered(alice);
        assert!(!roster.all_answered());

        roster.mark_answered(bob);
        assert!(roster.all_answered());

        roster.reset_answered();
        assert!(!roster.all_answered());
    }

    #[test]
    fn results_overwrite_scores() {
        use crate::dto::results::PlayerRoundResult;

        let alice = Uuid::new_v4();
        let mut roster = Roster::new();
        roster.apply_presence(PresenceEvent::Join {
            member_id: alice,
            record: record("alice", false),
        });

        let results = RoundResults {
            question_id: Uuid::new_v4(),
            question_index: 0,
            question_text: "2 + 2?".into(),
            correct_answer: "4".into(),
            explanation: None,
            per_player: vec![PlayerRoundResult {
                player_id: alice,
                name: "alice".into(),
                answer: Some("4".into()),
                is_correct: true,
                response_time_ms: 1200,
                points_earned: 940,
                new_total_score: 940,
            }],
        };
        roster.apply_results(&results);

        assert_eq!(roster.get(alice).unwrap().score, 940);
    }

    #[test]
    fn host_count_tracks_host_flag() {
        let mut roster = Roster::new();
        roster.apply_presence(PresenceEvent::Join {
            member_id: Uuid::new_v4(),
            record: record("host", true),
        });
        roster.apply_presence(PresenceEvent::Join {
            member_id: Uuid::new_v4(),
            record: record("guest", false),
        });
        assert_eq!(roster.host_count(), 1);
    }
}
