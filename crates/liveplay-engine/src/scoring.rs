//! The pluggable scoring policy.
//!
//! Point values are tuning data, not contract: product iterates on them
//! without touching the engine. The engine computes *when* each bonus is
//! eligible (streak carried, bingo slot won, synergy context assembled)
//! and asks the policy *how much* it is worth.

use liveplay_protocol::CSuiteRole;
use liveplay_store::RoundPlay;

/// What the policy gets to see when pricing a synergy bonus.
///
/// Synergy rewards coordinated correct answers within one round: the
/// participant's own declared role plus the roles of everyone who answered
/// the round correctly (their own included, when declared).
#[derive(Debug)]
pub struct SynergyContext<'a> {
    pub role: Option<CSuiteRole>,
    pub correct_roles: &'a [CSuiteRole],
}

/// Prices each scoring component. Object-safe and pure: implementations
/// must not hold mutable state or perform I/O.
pub trait ScoringPolicy: Send + Sync {
    /// Points for the play itself. Expected to be 0 for incorrect plays.
    fn base_points(&self, play: &RoundPlay) -> u32;

    /// Bonus for a correct play when `streak` consecutive previous rounds
    /// were also correct. `streak == 0` means no carry and must price to 0.
    fn streak_bonus(&self, streak: u32) -> u32;

    /// Bonus for winning one of the game's limited bingo slots.
    fn bingo_bonus(&self) -> u32;

    /// Bonus for a correct play in a qualifying role combination.
    fn synergy_bonus(&self, ctx: &SynergyContext<'_>) -> u32;
}

// ---------------------------------------------------------------------------
// StandardScoring
// ---------------------------------------------------------------------------

/// The default policy. Every value is a field so deployments can tune
/// without forking.
#[derive(Debug, Clone)]
pub struct StandardScoring {
    /// Points for a correct answer.
    pub base: u32,
    /// Extra points when the answer arrived within `fast_cutoff_ms`.
    pub fast_bonus: u32,
    pub fast_cutoff_ms: u64,
    /// Per-consecutive-round streak increment.
    pub streak_step: u32,
    /// Streak length beyond which the bonus stops growing.
    pub streak_cap: u32,
    /// Value of a bingo slot.
    pub bingo: u32,
    /// Value of a qualifying synergy combination.
    pub synergy: u32,
}

impl Default for StandardScoring {
    fn default() -> Self {
        Self {
            base: 100,
            fast_bonus: 50,
            fast_cutoff_ms: 3_000,
            streak_step: 25,
            streak_cap: 4,
            bingo: 500,
            synergy: 50,
        }
    }
}

impl ScoringPolicy for StandardScoring {
    fn base_points(&self, play: &RoundPlay) -> u32 {
        if !play.is_correct {
            return 0;
        }
        if play.response_time_ms <= self.fast_cutoff_ms {
            self.base + self.fast_bonus
        } else {
            self.base
        }
    }

    fn streak_bonus(&self, streak: u32) -> u32 {
        self.streak_step * streak.min(self.streak_cap)
    }

    fn bingo_bonus(&self) -> u32 {
        self.bingo
    }

    fn synergy_bonus(&self, ctx: &SynergyContext<'_>) -> u32 {
        // A pair qualifies when the participant declared a role and at
        // least one *other* correct participant declared a different one.
        let Some(own) = ctx.role else { return 0 };
        let has_partner = ctx.correct_roles.iter().any(|r| *r != own);
        if has_partner {
            self.synergy
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveplay_protocol::{ParticipantId, PlayId, SessionId, TargetId};

    fn play(correct: bool, response_ms: u64) -> RoundPlay {
        RoundPlay {
            id: PlayId(1),
            session_id: SessionId(1),
            round_number: 1,
            participant_id: ParticipantId(1),
            clicked_target: TargetId(0),
            is_correct: correct,
            response_time_ms: response_ms,
            submitted_at: 0,
        }
    }

    #[test]
    fn test_base_points_zero_for_incorrect() {
        let policy = StandardScoring::default();
        assert_eq!(policy.base_points(&play(false, 100)), 0);
    }

    #[test]
    fn test_base_points_rewards_fast_answers() {
        let policy = StandardScoring::default();
        assert_eq!(policy.base_points(&play(true, 1_000)), 150);
        assert_eq!(policy.base_points(&play(true, 10_000)), 100);
    }

    #[test]
    fn test_streak_bonus_grows_then_caps() {
        let policy = StandardScoring::default();
        assert_eq!(policy.streak_bonus(0), 0);
        assert_eq!(policy.streak_bonus(1), 25);
        assert_eq!(policy.streak_bonus(4), 100);
        assert_eq!(policy.streak_bonus(9), 100, "capped at streak_cap");
    }

    #[test]
    fn test_synergy_requires_declared_role() {
        let policy = StandardScoring::default();
        let ctx = SynergyContext {
            role: None,
            correct_roles: &[CSuiteRole::Ceo, CSuiteRole::Cfo],
        };
        assert_eq!(policy.synergy_bonus(&ctx), 0);
    }

    #[test]
    fn test_synergy_requires_a_different_partner_role() {
        let policy = StandardScoring::default();

        // Only our own role among the correct answers — no pair.
        let solo = SynergyContext {
            role: Some(CSuiteRole::Ceo),
            correct_roles: &[CSuiteRole::Ceo],
        };
        assert_eq!(policy.synergy_bonus(&solo), 0);

        let pair = SynergyContext {
            role: Some(CSuiteRole::Ceo),
            correct_roles: &[CSuiteRole::Ceo, CSuiteRole::Cto],
        };
        assert_eq!(policy.synergy_bonus(&pair), 50);
    }

    #[test]
    fn test_values_are_tunable() {
        let policy = StandardScoring {
            base: 10,
            fast_bonus: 0,
            ..StandardScoring::default()
        };
        assert_eq!(policy.base_points(&play(true, 100)), 10);
    }
}
