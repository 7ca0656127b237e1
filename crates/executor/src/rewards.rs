//! Miner and uncle reward accumulation.

use emerald_chainspec::{ChainSpec, RewardSchedule};
use emerald_primitives::{constants::BASE_BLOCK_REWARD, Header, U256};
use emerald_state::{State, StateError};
use tracing::trace;

/// Credits the winning miner and every uncle miner for `header` per the
/// schedule configured at its height.
pub fn apply_block_rewards(
    spec: &ChainSpec,
    state: &mut State,
    header: &Header,
    ommers: &[Header],
) -> Result<(), StateError> {
    match spec.reward_schedule(header.number) {
        RewardSchedule::Constant => {
            let mut winner = BASE_BLOCK_REWARD;
            for uncle in ommers {
                state.add_balance(uncle.beneficiary, ommer_distance_reward(uncle, header))?;
                winner += BASE_BLOCK_REWARD / U256::from(32u64);
            }
            state.add_balance(header.beneficiary, winner)?;
        }
        RewardSchedule::Ecip1017 { era_length } => {
            let era = header.number.saturating_sub(1) / era_length;
            let winner_base = era_reward(era);
            trace!(target: "executor", number = header.number, era, %winner_base, "era reward");

            let mut winner = winner_base;
            for uncle in ommers {
                let uncle_reward = if era == 0 {
                    ommer_distance_reward(uncle, header)
                } else {
                    winner_base / U256::from(32u64)
                };
                state.add_balance(uncle.beneficiary, uncle_reward)?;
                winner += winner_base / U256::from(32u64);
            }
            state.add_balance(header.beneficiary, winner)?;
        }
    }
    Ok(())
}

/// First-era uncle miner reward, decaying with distance:
/// `(uncle.number + 8 - header.number) / 8` of the base reward.
fn ommer_distance_reward(uncle: &Header, header: &Header) -> U256 {
    let distance_factor = (uncle.number + 8).saturating_sub(header.number);
    U256::from(distance_factor) * BASE_BLOCK_REWARD / U256::from(8u64)
}

/// Winner reward in `era`: the base reward scaled by `(4/5)^era`.
fn era_reward(era: u64) -> U256 {
    let mut reward = BASE_BLOCK_REWARD;
    for _ in 0..era {
        reward = reward * U256::from(4u64) / U256::from(5u64);
        if reward.is_zero() {
            break;
        }
    }
    reward
}
