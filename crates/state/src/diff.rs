use emerald_primitives::{Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// One committed state transition, keyed on disk by its post-state root and
/// linked to the parent root it applies on top of.
///
/// The parent of the genesis commit is the empty trie root, which terminates
/// materialization walks.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StateDiff {
    /// Root this diff applies on top of.
    pub parent: B256,
    /// Accounts touched by the transition.
    pub accounts: Vec<AccountDiff>,
}

/// Post-state of one touched account.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountDiff {
    /// The account address.
    pub address: Address,
    /// Whether the account was deleted by this transition.
    pub removed: bool,
    /// Post-transition nonce.
    pub nonce: u64,
    /// Post-transition balance.
    pub balance: U256,
    /// Post-transition code hash.
    pub code_hash: B256,
    /// Storage slots changed by the transition. A zero value clears the
    /// slot.
    pub storage: Vec<SlotDiff>,
}

/// One changed storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct SlotDiff {
    /// Slot key.
    pub key: B256,
    /// Post-transition value, zero to clear.
    pub value: U256,
}
