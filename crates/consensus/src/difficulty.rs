//! Difficulty recalculation.
//!
//! Four algorithms are dispatched by the chain configuration: the frontier
//! step adjustment, the homestead proportional adjustment, and the two
//! ECIP-1010 phases that first freeze the difficulty bomb and then resume it
//! with its exponent reduced by the pause length. All divisions floor.

use emerald_chainspec::DifficultyAlgorithm;
use emerald_primitives::{
    constants::{DIFFICULTY_BOUND_DIVISOR, EXP_DIFF_PERIOD, MINIMUM_DIFFICULTY},
    BlockNumber, Header, U256,
};

/// Computes the expected difficulty of a block with timestamp `time` built
/// on `parent`.
pub fn calc_difficulty(algorithm: DifficultyAlgorithm, time: U256, parent: &Header) -> U256 {
    match algorithm {
        DifficultyAlgorithm::Frontier => frontier(time, parent),
        DifficultyAlgorithm::Homestead => {
            homestead_base(time, parent) + bomb((parent.number + 1) / EXP_DIFF_PERIOD)
        }
        DifficultyAlgorithm::Ecip1010Pause { fork_block } => {
            // the bomb freezes at the pausing fork's own period
            homestead_base(time, parent) + bomb(fork_block / EXP_DIFF_PERIOD)
        }
        DifficultyAlgorithm::Ecip1010Explosion { fork_block, explosion_block } => {
            // resume as if the pause never happened: the delay length is
            // subtracted out of the period count
            let period = (parent.number + 1 + fork_block - explosion_block) / EXP_DIFF_PERIOD;
            homestead_base(time, parent) + bomb(period)
        }
    }
}

fn frontier(time: U256, parent: &Header) -> U256 {
    let adjust = parent.difficulty / DIFFICULTY_BOUND_DIVISOR;
    let delta = time.saturating_sub(parent.timestamp);
    let diff = if delta < U256::from(13u64) {
        parent.difficulty + adjust
    } else {
        parent.difficulty.saturating_sub(adjust)
    };
    diff.max(MINIMUM_DIFFICULTY) + bomb((parent.number + 1) / EXP_DIFF_PERIOD)
}

/// Homestead adjustment without the bomb term:
/// `max(1 - Δt/10, -99)` steps of `parent.difficulty / 2048`, clamped to the
/// minimum difficulty.
fn homestead_base(time: U256, parent: &Header) -> U256 {
    let delta = time.saturating_sub(parent.timestamp);
    let decades: u64 = (delta / U256::from(10u64)).saturating_to();
    let x = 1i64.saturating_sub_unsigned(decades).max(-99);

    let adjust = parent.difficulty / DIFFICULTY_BOUND_DIVISOR;
    let diff = if x >= 0 {
        parent.difficulty + adjust * U256::from(x as u64)
    } else {
        parent.difficulty.saturating_sub(adjust * U256::from(x.unsigned_abs()))
    };
    diff.max(MINIMUM_DIFFICULTY)
}

/// The exponential term `2^(period - 2)`, zero while the period has not
/// reached two.
fn bomb(period: BlockNumber) -> U256 {
    if period > 1 && period - 2 < 256 {
        U256::from(1u64) << (period - 2) as usize
    } else {
        U256::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(number: BlockNumber, timestamp: u64, difficulty: u64) -> Header {
        Header {
            number,
            timestamp: U256::from(timestamp),
            difficulty: U256::from(difficulty),
            ..Default::default()
        }
    }

    #[test]
    fn homestead_matches_formula_and_floors() {
        // Δt = 8 keeps the adjustment step at +1
        let parent = parent(494_000, 1_000_000, 4096);
        let got = calc_difficulty(
            DifficultyAlgorithm::Homestead,
            U256::from(1_000_008u64),
            &parent,
        );
        // base 4096 + 4096/2048 clamps up to the minimum, then the bomb for
        // period (494001/100000) = 4 adds 2^2
        let expected = MINIMUM_DIFFICULTY + U256::from(4u64);
        assert_eq!(got, expected);
    }

    #[test]
    fn homestead_boundary_at_ten_seconds_is_a_zero_step() {
        let parent = parent(100, 1_000_000, 10_000_000);
        let at_nine = calc_difficulty(
            DifficultyAlgorithm::Homestead,
            U256::from(1_000_009u64),
            &parent,
        );
        let at_ten = calc_difficulty(
            DifficultyAlgorithm::Homestead,
            U256::from(1_000_010u64),
            &parent,
        );
        let at_twenty = calc_difficulty(
            DifficultyAlgorithm::Homestead,
            U256::from(1_000_020u64),
            &parent,
        );

        let step = U256::from(10_000_000u64) / DIFFICULTY_BOUND_DIVISOR;
        assert_eq!(at_nine, U256::from(10_000_000u64) + step);
        // Δt in [10, 20) yields x = 0
        assert_eq!(at_ten, U256::from(10_000_000u64));
        assert_eq!(at_twenty, U256::from(10_000_000u64) - step);
    }

    #[test]
    fn homestead_adjustment_clamps_at_minus_ninety_nine() {
        let parent = parent(100, 1_000_000, 10_000_000);
        // Δt of an hour drives x far below the clamp
        let got = calc_difficulty(
            DifficultyAlgorithm::Homestead,
            U256::from(1_003_600u64),
            &parent,
        );
        let step = U256::from(10_000_000u64) / DIFFICULTY_BOUND_DIVISOR;
        assert_eq!(got, U256::from(10_000_000u64) - step * U256::from(99u64));
    }

    #[test]
    fn diehard_pause_freezes_the_bomb() {
        // witness: ETC mainnet block in the pause phase
        let parent = parent(3_500_000, 1_452_838_500, 7_654_414_978_364);
        let got = calc_difficulty(
            DifficultyAlgorithm::Ecip1010Pause { fork_block: 3_000_000 },
            U256::from(1_452_838_520u64),
            &parent,
        );
        assert_eq!(got, U256::from(7_650_945_906_507u64));
    }

    #[test]
    fn explosion_resumes_with_reduced_exponent() {
        // witness: ETC mainnet block just past the explosion boundary
        let parent = parent(5_000_102, 1_513_175_023, 22_627_021_745_803);
        let got = calc_difficulty(
            DifficultyAlgorithm::Ecip1010Explosion {
                fork_block: 3_000_000,
                explosion_block: 5_000_000,
            },
            U256::from(1_513_175_029u64),
            &parent,
        );
        assert_eq!(got, U256::from(22_638_338_531_720u64));
    }

    #[test]
    fn frontier_steps_and_clamps() {
        let fast = calc_difficulty(
            DifficultyAlgorithm::Frontier,
            U256::from(1_000_005u64),
            &parent(10, 1_000_000, 1_000_000),
        );
        assert_eq!(fast, U256::from(1_000_000u64 + 1_000_000 / 2048));

        let slow = calc_difficulty(
            DifficultyAlgorithm::Frontier,
            U256::from(1_000_013u64),
            &parent(10, 1_000_000, 1_000_000),
        );
        assert_eq!(slow, U256::from(1_000_000u64 - 1_000_000 / 2048));

        // tiny parent difficulty clamps up to the minimum
        let clamped = calc_difficulty(
            DifficultyAlgorithm::Frontier,
            U256::from(1_000_013u64),
            &parent(10, 1_000_000, 1000),
        );
        assert_eq!(clamped, MINIMUM_DIFFICULTY);
    }

    #[test]
    fn frontier_bomb_activates_at_period_two() {
        let before = calc_difficulty(
            DifficultyAlgorithm::Frontier,
            U256::from(1_000_005u64),
            &parent(199_998, 1_000_000, 1_000_000),
        );
        let after = calc_difficulty(
            DifficultyAlgorithm::Frontier,
            U256::from(1_000_005u64),
            &parent(199_999, 1_000_000, 1_000_000),
        );
        // period reaches 2 at parent 199,999 and contributes 2^0
        assert_eq!(after, before + U256::from(1u64));
    }
}
