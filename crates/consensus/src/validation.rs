use crate::{calc_difficulty, ConsensusError, PowVerifier};
use emerald_chainspec::ChainSpec;
use emerald_primitives::{
    constants::{
        GAS_LIMIT_BOUND_DIVISOR, MAXIMUM_EXTRA_DATA_SIZE, MAX_UNCLES, MINIMUM_GAS_LIMIT,
        UNCLE_WINDOW,
    },
    logs_bloom, proofs, Receipt, SealedBlock, SealedHeader, B256, U256,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

/// Read access to already-stored chain data, as needed by body validation.
pub trait ChainLookup {
    /// The header with the given hash, if stored.
    fn lookup_header(&self, hash: &B256) -> Option<SealedHeader>;

    /// The full block with the given hash, if stored.
    fn lookup_block(&self, hash: &B256) -> Option<SealedBlock>;

    /// Whether a block with the given hash is stored.
    fn has_block(&self, hash: &B256) -> bool;

    /// Whether the block is stored and its post-state is available.
    fn has_block_and_state(&self, hash: &B256) -> bool;
}

/// Validates a header against its parent.
///
/// `pow` is consulted when sealing must be checked; pass `None` for headers
/// whose work is attested elsewhere. `uncle` relaxes the wall-clock check,
/// since uncles may legitimately carry timestamps ahead of the local clock.
pub fn validate_header(
    spec: &ChainSpec,
    header: &SealedHeader,
    parent: &SealedHeader,
    pow: Option<&dyn PowVerifier>,
    uncle: bool,
) -> Result<(), ConsensusError> {
    if header.extra_data.len() > MAXIMUM_EXTRA_DATA_SIZE {
        return Err(ConsensusError::ExtraDataTooLong {
            len: header.extra_data.len(),
            max: MAXIMUM_EXTRA_DATA_SIZE,
        });
    }

    if !uncle {
        let now = unix_now();
        if header.timestamp > U256::from(now) {
            return Err(ConsensusError::BlockFuture { timestamp: header.timestamp, now });
        }
    }

    if header.timestamp <= parent.timestamp {
        return Err(ConsensusError::BlockEqualTimestamp {
            timestamp: header.timestamp,
            parent: parent.timestamp,
        });
    }

    let expected = calc_difficulty(
        spec.difficulty_algorithm(header.number),
        header.timestamp,
        parent.header(),
    );
    if header.difficulty != expected {
        return Err(ConsensusError::DifficultyMismatch(
            (header.difficulty, expected).into(),
        ));
    }

    let drift = parent.gas_limit.abs_diff(header.gas_limit);
    if drift >= parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR || header.gas_limit < MINIMUM_GAS_LIMIT
    {
        return Err(ConsensusError::GasLimitDrift {
            parent_gas_limit: parent.gas_limit,
            gas_limit: header.gas_limit,
        });
    }

    if header.number != parent.number + 1 {
        return Err(ConsensusError::BlockNumberMismatch(
            (header.number, parent.number + 1).into(),
        ));
    }

    if let Some(pow) = pow {
        pow.verify_seal(header)?;
    }

    spec.header_check(header)?;
    Ok(())
}

/// Validates a block body: ancestry, uncle eligibility and the body roots.
///
/// The header itself is assumed to have passed [`validate_header`].
pub fn validate_body<C: ChainLookup>(
    chain: &C,
    spec: &ChainSpec,
    pow: &dyn PowVerifier,
    block: &SealedBlock,
) -> Result<(), ConsensusError> {
    if chain.has_block_and_state(&block.hash()) {
        return Err(ConsensusError::KnownBlock { hash: block.hash() });
    }
    if !chain.has_block_and_state(&block.parent_hash) {
        if chain.has_block(&block.parent_hash) {
            return Err(ConsensusError::PrunedAncestor { hash: block.parent_hash });
        }
        return Err(ConsensusError::UnknownAncestor { hash: block.parent_hash });
    }

    validate_uncles(chain, spec, pow, block)?;

    let ommers_hash = proofs::calculate_ommers_hash(&block.ommers);
    if ommers_hash != block.ommers_hash {
        return Err(ConsensusError::OmmersRootMismatch(
            (ommers_hash, block.ommers_hash).into(),
        ));
    }

    let transactions_root = proofs::calculate_transaction_root(&block.body);
    if transactions_root != block.transactions_root {
        return Err(ConsensusError::TransactionRootMismatch(
            (transactions_root, block.transactions_root).into(),
        ));
    }
    Ok(())
}

fn validate_uncles<C: ChainLookup>(
    chain: &C,
    spec: &ChainSpec,
    pow: &dyn PowVerifier,
    block: &SealedBlock,
) -> Result<(), ConsensusError> {
    if block.ommers.len() > MAX_UNCLES {
        return Err(ConsensusError::TooManyUncles { count: block.ommers.len() });
    }
    if block.ommers.is_empty() {
        return Ok(());
    }

    // collect the ancestor window and every uncle those ancestors included
    let mut ancestors: HashMap<B256, SealedHeader> = HashMap::new();
    let mut included: HashSet<B256> = HashSet::new();
    let mut cursor = block.parent_hash;
    for _ in 0..UNCLE_WINDOW {
        let Some(ancestor) = chain.lookup_block(&cursor) else { break };
        for uncle in &ancestor.ommers {
            included.insert(uncle.hash_slow());
        }
        cursor = ancestor.parent_hash;
        let number = ancestor.number;
        ancestors.insert(ancestor.hash(), ancestor.header);
        if number == 0 {
            break;
        }
    }

    for uncle in &block.ommers {
        let sealed = uncle.clone().seal_slow();
        let hash = sealed.hash();
        if !included.insert(hash) {
            return Err(ConsensusError::UncleNotUnique { hash });
        }
        if ancestors.contains_key(&hash) {
            return Err(ConsensusError::UncleIsAncestor { hash });
        }
        let Some(uncle_parent) = ancestors.get(&sealed.parent_hash) else {
            return Err(ConsensusError::UncleParentNotAncestor { hash });
        };
        // a sibling of the block itself is not an uncle
        if sealed.parent_hash == block.parent_hash {
            return Err(ConsensusError::UncleParentNotAncestor { hash });
        }
        validate_header(spec, &sealed, uncle_parent, Some(pow), true)?;
        trace!(target: "consensus", uncle = %hash, block = %block.hash(), "validated uncle");
    }
    Ok(())
}

/// Validates a block against its execution results: gas used, log bloom,
/// receipts root and post-state root.
pub fn validate_block_post_execution(
    block: &SealedBlock,
    receipts: &[Receipt],
    gas_used: u64,
    state_root: B256,
) -> Result<(), ConsensusError> {
    if block.gas_used != gas_used {
        return Err(ConsensusError::GasUsedMismatch((gas_used, block.gas_used).into()));
    }

    let bloom = logs_bloom(receipts.iter().flat_map(|receipt| receipt.logs.iter()));
    if bloom != block.logs_bloom {
        return Err(ConsensusError::BloomMismatch(Box::new(
            (bloom, block.logs_bloom).into(),
        )));
    }

    let receipts_with_bloom: Vec<_> =
        receipts.iter().map(|receipt| receipt.clone().with_bloom()).collect();
    let receipts_root = proofs::calculate_receipt_root(&receipts_with_bloom);
    if receipts_root != block.receipts_root {
        return Err(ConsensusError::ReceiptsRootMismatch(
            (receipts_root, block.receipts_root).into(),
        ));
    }

    if state_root != block.state_root {
        return Err(ConsensusError::StateRootMismatch(
            (state_root, block.state_root).into(),
        ));
    }
    Ok(())
}

/// Bundles the chain spec and seal verifier behind one validation surface.
#[derive(Debug, Clone)]
pub struct BlockValidator {
    spec: Arc<ChainSpec>,
    pow: Arc<dyn PowVerifier>,
}

impl BlockValidator {
    /// Creates a validator.
    pub fn new(spec: Arc<ChainSpec>, pow: Arc<dyn PowVerifier>) -> Self {
        Self { spec, pow }
    }

    /// The seal verifier.
    pub fn pow(&self) -> &dyn PowVerifier {
        &*self.pow
    }

    /// See [`validate_header`].
    pub fn validate_header(
        &self,
        header: &SealedHeader,
        parent: &SealedHeader,
        check_pow: bool,
        uncle: bool,
    ) -> Result<(), ConsensusError> {
        let pow = check_pow.then_some(&*self.pow);
        validate_header(&self.spec, header, parent, pow, uncle)
    }

    /// See [`validate_body`].
    pub fn validate_body<C: ChainLookup>(
        &self,
        chain: &C,
        block: &SealedBlock,
    ) -> Result<(), ConsensusError> {
        validate_body(chain, &self.spec, &*self.pow, block)
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoopPow;
    use assert_matches::assert_matches;
    use emerald_chainspec::{ChainSpecBuilder, DifficultyAlgorithm, GenesisDump};
    use emerald_primitives::{constants::EMPTY_OMMERS_HASH, Bytes, Header};

    fn spec() -> ChainSpec {
        ChainSpecBuilder::new("unittest", 62, GenesisDump::default())
            .with_fork("Frontier", 0, vec![])
            .build()
    }

    fn parent() -> SealedHeader {
        Header {
            number: 10,
            gas_limit: 4_000_000,
            difficulty: U256::from(131_072u64),
            timestamp: U256::from(1_000_000u64),
            ..Default::default()
        }
        .seal_slow()
    }

    fn child_of(parent: &SealedHeader) -> Header {
        let timestamp = parent.timestamp + U256::from(14u64);
        Header {
            parent_hash: parent.hash(),
            number: parent.number + 1,
            gas_limit: parent.gas_limit,
            timestamp,
            difficulty: calc_difficulty(DifficultyAlgorithm::Frontier, timestamp, parent.header()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_header_passes() {
        let spec = spec();
        let parent = parent();
        let header = child_of(&parent).seal_slow();
        validate_header(&spec, &header, &parent, Some(&NoopPow), false).unwrap();
    }

    #[test]
    fn rejects_wrong_difficulty() {
        let spec = spec();
        let parent = parent();
        let mut header = child_of(&parent);
        header.difficulty += U256::from(1u64);
        let err = validate_header(&spec, &header.seal_slow(), &parent, None, false).unwrap_err();
        assert_matches!(err, ConsensusError::DifficultyMismatch(_));
    }

    #[test]
    fn rejects_timestamp_not_after_parent() {
        let spec = spec();
        let parent = parent();
        let mut header = child_of(&parent);
        header.timestamp = parent.timestamp;
        let err = validate_header(&spec, &header.seal_slow(), &parent, None, false).unwrap_err();
        assert_matches!(err, ConsensusError::BlockEqualTimestamp { .. });
    }

    #[test]
    fn rejects_future_blocks_but_not_future_uncles() {
        let spec = spec();
        let parent = parent();
        let mut header = child_of(&parent);
        header.timestamp = U256::from(unix_now() + 3600);
        header.difficulty =
            calc_difficulty(DifficultyAlgorithm::Frontier, header.timestamp, parent.header());
        let sealed = header.seal_slow();

        assert_matches!(
            validate_header(&spec, &sealed, &parent, None, false),
            Err(ConsensusError::BlockFuture { .. })
        );
        assert_matches!(validate_header(&spec, &sealed, &parent, None, true), Ok(()));
    }

    #[test]
    fn rejects_gas_limit_violations() {
        let spec = spec();
        let parent = parent();

        let mut drifted = child_of(&parent);
        drifted.gas_limit = parent.gas_limit + parent.gas_limit / 1024;
        assert_matches!(
            validate_header(&spec, &drifted.seal_slow(), &parent, None, false),
            Err(ConsensusError::GasLimitDrift { .. })
        );

        let low_parent = Header { gas_limit: 5003, ..parent.header().clone() }.seal_slow();
        let mut floor = child_of(&low_parent);
        floor.gas_limit = 4999;
        assert_matches!(
            validate_header(&spec, &floor.seal_slow(), &low_parent, None, false),
            Err(ConsensusError::GasLimitDrift { .. })
        );
    }

    #[test]
    fn rejects_wrong_number_and_long_extra_data() {
        let spec = spec();
        let parent = parent();

        let mut wrong_number = child_of(&parent);
        wrong_number.number += 1;
        assert_matches!(
            validate_header(&spec, &wrong_number.seal_slow(), &parent, None, false),
            Err(ConsensusError::BlockNumberMismatch(_))
        );

        let mut wordy = child_of(&parent);
        wordy.extra_data = Bytes::from(vec![0u8; 33]);
        assert_matches!(
            validate_header(&spec, &wordy.seal_slow(), &parent, None, false),
            Err(ConsensusError::ExtraDataTooLong { len: 33, max: 32 })
        );
    }

    #[derive(Default)]
    struct MockChain {
        blocks: HashMap<B256, SealedBlock>,
        stateless: HashSet<B256>,
    }

    impl MockChain {
        fn insert(&mut self, block: SealedBlock) {
            self.blocks.insert(block.hash(), block);
        }
    }

    impl ChainLookup for MockChain {
        fn lookup_header(&self, hash: &B256) -> Option<SealedHeader> {
            self.blocks.get(hash).map(|block| block.header.clone())
        }

        fn lookup_block(&self, hash: &B256) -> Option<SealedBlock> {
            self.blocks.get(hash).cloned()
        }

        fn has_block(&self, hash: &B256) -> bool {
            self.blocks.contains_key(hash)
        }

        fn has_block_and_state(&self, hash: &B256) -> bool {
            self.blocks.contains_key(hash) && !self.stateless.contains(hash)
        }
    }

    /// Builds a three-block chain and returns it plus the tip.
    fn mock_chain() -> (MockChain, SealedBlock) {
        let mut chain = MockChain::default();
        let genesis = SealedBlock {
            header: Header {
                number: 0,
                gas_limit: 4_000_000,
                difficulty: U256::from(131_072u64),
                timestamp: U256::from(999_000u64),
                ommers_hash: EMPTY_OMMERS_HASH,
                ..Default::default()
            }
            .seal_slow(),
            body: Vec::new(),
            ommers: Vec::new(),
        };
        let mut tip = genesis.clone();
        chain.insert(genesis);
        for _ in 0..2 {
            let header = child_of(&tip.header);
            let block = SealedBlock {
                header: Header { ommers_hash: EMPTY_OMMERS_HASH, ..header }.seal_slow(),
                body: Vec::new(),
                ommers: Vec::new(),
            };
            chain.insert(block.clone());
            tip = block;
        }
        (chain, tip)
    }

    fn body_on(tip: &SealedBlock, ommers: Vec<Header>) -> SealedBlock {
        let header = Header {
            ommers_hash: proofs::calculate_ommers_hash(&ommers),
            transactions_root: proofs::calculate_transaction_root(&[]),
            receipts_root: emerald_primitives::constants::EMPTY_ROOT_HASH,
            ..child_of(&tip.header)
        };
        SealedBlock { header: header.seal_slow(), body: Vec::new(), ommers }
    }

    #[test]
    fn body_validation_flags_missing_and_stateless_parents() {
        let spec = spec();
        let (mut chain, tip) = mock_chain();
        let block = body_on(&tip, Vec::new());

        validate_body(&chain, &spec, &NoopPow, &block).unwrap();

        let orphan = SealedBlock {
            header: Header { parent_hash: B256::repeat_byte(0xee), ..block.header.header().clone() }
                .seal_slow(),
            body: Vec::new(),
            ommers: Vec::new(),
        };
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &orphan),
            Err(ConsensusError::UnknownAncestor { .. })
        );

        chain.stateless.insert(tip.hash());
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &block),
            Err(ConsensusError::PrunedAncestor { .. })
        );
    }

    #[test]
    fn body_validation_rejects_known_blocks() {
        let spec = spec();
        let (mut chain, tip) = mock_chain();
        let block = body_on(&tip, Vec::new());
        chain.insert(block.clone());
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &block),
            Err(ConsensusError::KnownBlock { .. })
        );
    }

    #[test]
    fn uncle_rules() {
        let spec = spec();
        let (chain, tip) = mock_chain();
        // a sibling of the tip: valid uncle for a block on the tip
        let grandparent = chain.lookup_header(&tip.parent_hash).unwrap();
        let mut uncle = child_of(&grandparent);
        uncle.timestamp += U256::from(1u64);
        uncle.difficulty =
            calc_difficulty(DifficultyAlgorithm::Frontier, uncle.timestamp, grandparent.header());

        let block = body_on(&tip, vec![uncle.clone()]);
        validate_body(&chain, &spec, &NoopPow, &block).unwrap();

        // duplicated uncle
        let twice = body_on(&tip, vec![uncle.clone(), uncle.clone()]);
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &twice),
            Err(ConsensusError::UncleNotUnique { .. })
        );

        // an ancestor is no uncle
        let ancestor_uncle = body_on(&tip, vec![tip.header.header().clone()]);
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &ancestor_uncle),
            Err(ConsensusError::UncleIsAncestor { .. })
        );

        // sibling of the new block itself is rejected
        let mut sibling = child_of(&tip.header);
        sibling.timestamp += U256::from(1u64);
        sibling.difficulty =
            calc_difficulty(DifficultyAlgorithm::Frontier, sibling.timestamp, tip.header());
        let with_sibling = body_on(&tip, vec![sibling]);
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &with_sibling),
            Err(ConsensusError::UncleParentNotAncestor { .. })
        );

        // unknown parentage
        let stray = Header { parent_hash: B256::repeat_byte(0xaa), ..child_of(&tip.header) };
        let with_stray = body_on(&tip, vec![stray]);
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &with_stray),
            Err(ConsensusError::UncleParentNotAncestor { .. })
        );

        // more than two uncles
        let many = body_on(
            &tip,
            vec![
                Header { number: 1, ..Default::default() },
                Header { number: 2, ..Default::default() },
                Header { number: 3, ..Default::default() },
            ],
        );
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &many),
            Err(ConsensusError::TooManyUncles { count: 3 })
        );
    }

    #[test]
    fn body_validation_checks_roots() {
        let spec = spec();
        let (chain, tip) = mock_chain();

        let mut block = body_on(&tip, Vec::new());
        block = SealedBlock {
            header: Header { ommers_hash: B256::repeat_byte(1), ..block.header.header().clone() }
                .seal_slow(),
            body: block.body,
            ommers: block.ommers,
        };
        assert_matches!(
            validate_body(&chain, &spec, &NoopPow, &block),
            Err(ConsensusError::OmmersRootMismatch(_))
        );
    }

    #[test]
    fn post_execution_checks_flag_each_mismatch() {
        let block = body_on(&mock_chain().1, Vec::new());

        // gas used disagrees
        assert_matches!(
            validate_block_post_execution(&block, &[], 1, block.state_root),
            Err(ConsensusError::GasUsedMismatch(_))
        );
        // matching gas, roots and bloom pass
        validate_block_post_execution(&block, &[], 0, block.state_root).unwrap();
        // state root disagrees
        assert_matches!(
            validate_block_post_execution(&block, &[], 0, B256::repeat_byte(9)),
            Err(ConsensusError::StateRootMismatch(_))
        );
    }
}
