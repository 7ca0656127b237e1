use crate::{
    fork::RawFork, BadHash, CheckpointError, DifficultyFeature, Eip155Feature, FeatureKind, Fork,
    ForkFeature, GasTable, GasTableFeature, GenesisDump, RewardFeature, SpecError,
};
use emerald_primitives::{BlockNumber, SealedHeader, Signer};
use serde::Deserialize;

/// Sealing engine of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ConsensusEngine {
    /// Real ethash proof of work.
    #[serde(rename = "ethash")]
    Ethash,
    /// Ethash interface with sealing checks stubbed out, for test networks.
    #[serde(rename = "ethash-test")]
    EthashTest,
}

/// Difficulty algorithm selected for one block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyAlgorithm {
    /// Original frontier step adjustment.
    Frontier,
    /// Homestead proportional adjustment.
    Homestead,
    /// Homestead base with the bomb frozen at the activating fork.
    Ecip1010Pause {
        /// Activation height of the pausing fork.
        fork_block: BlockNumber,
    },
    /// Homestead base with the bomb resumed, its exponent reduced by the
    /// pause length.
    Ecip1010Explosion {
        /// Activation height of the pausing fork.
        fork_block: BlockNumber,
        /// First height at which the bomb resumes.
        explosion_block: BlockNumber,
    },
}

/// Block reward schedule selected for one block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardSchedule {
    /// Constant base reward.
    Constant,
    /// ECIP-1017 era-indexed disinflation.
    Ecip1017 {
        /// Blocks per era.
        era_length: u64,
    },
}

/// A fully parsed chain configuration.
///
/// Forks are kept sorted by activation height; feature queries return the
/// latest fork at or before the queried height that declares the feature.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    /// Chain identity string, e.g. `mainnet` or `morden`.
    pub identity: String,
    /// Network id used by the wire protocol.
    pub network: u64,
    /// Sealing engine.
    pub consensus: ConsensusEngine,
    /// Genesis dump.
    pub genesis: GenesisDump,
    /// Forks sorted ascending by activation block.
    forks: Vec<Fork>,
    /// Known-invalid header hashes.
    bad_hashes: Vec<BadHash>,
    /// Bootstrap node URLs.
    pub bootstrap: Vec<String>,
    /// Nonce assigned to newly created accounts.
    pub starting_nonce: u64,
}

impl ChainSpec {
    /// Parses a chain configuration document.
    pub fn load_json(document: &str) -> Result<Self, SpecError> {
        let raw: RawSpec = serde_json::from_str(document)?;
        let config = raw.chain_config.ok_or(SpecError::NoForks)?;
        if config.forks.is_empty() {
            return Err(SpecError::NoForks);
        }

        let mut forks = Vec::with_capacity(config.forks.len());
        for fork in config.forks {
            forks.push(fork.into_fork()?);
        }
        forks.sort_by_key(|fork| fork.block);

        let starting_nonce = match raw.state.and_then(|state| state.starting_nonce) {
            Some(nonce) => nonce,
            // morden-like testnets offset account nonces to fence off replay
            None if raw.identity.contains("morden") => 0x100000,
            None => 0,
        };

        Ok(Self {
            identity: raw.identity,
            network: raw.network,
            consensus: raw.consensus,
            genesis: raw.genesis,
            forks,
            bad_hashes: config.bad_hashes,
            bootstrap: raw.bootstrap,
            starting_nonce,
        })
    }

    /// The configured forks, ascending by activation block.
    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    /// The known-bad header hashes.
    pub fn bad_hashes(&self) -> &[BadHash] {
        &self.bad_hashes
    }

    /// Returns the feature of `kind` in force at `number` together with the
    /// fork that defines it: the latest declaring fork at or before `number`.
    pub fn get_feature(
        &self,
        number: BlockNumber,
        kind: FeatureKind,
    ) -> Option<(&ForkFeature, &Fork)> {
        self.forks
            .iter()
            .rev()
            .filter(|fork| fork.block <= number)
            .find_map(|fork| fork.feature(kind).map(|feature| (feature, fork)))
    }

    /// The difficulty algorithm for a block at `number`.
    pub fn difficulty_algorithm(&self, number: BlockNumber) -> DifficultyAlgorithm {
        match self.get_feature(number, FeatureKind::Difficulty) {
            Some((ForkFeature::Difficulty(DifficultyFeature::Homestead), _)) => {
                DifficultyAlgorithm::Homestead
            }
            Some((ForkFeature::Difficulty(DifficultyFeature::Ecip1010 { length }), fork)) => {
                let explosion_block = fork.block + length;
                if number < explosion_block {
                    DifficultyAlgorithm::Ecip1010Pause { fork_block: fork.block }
                } else {
                    DifficultyAlgorithm::Ecip1010Explosion {
                        fork_block: fork.block,
                        explosion_block,
                    }
                }
            }
            _ => DifficultyAlgorithm::Frontier,
        }
    }

    /// The opcode gas schedule for a block at `number`.
    pub fn gas_table(&self, number: BlockNumber) -> GasTable {
        match self.get_feature(number, FeatureKind::GasTable) {
            Some((ForkFeature::GasTable(GasTableFeature::Eip150), _)) => GasTable::eip150(),
            Some((ForkFeature::GasTable(GasTableFeature::Eip160), _)) => GasTable::eip160(),
            _ => GasTable::homestead(),
        }
    }

    /// The replay-protection chain id at `number`, if configured.
    pub fn chain_id(&self, number: BlockNumber) -> Option<u64> {
        match self.get_feature(number, FeatureKind::Eip155) {
            Some((ForkFeature::Eip155(Eip155Feature { chain_id }), _)) => Some(*chain_id),
            _ => None,
        }
    }

    /// The transaction signing scheme at `number`.
    pub fn signer(&self, number: BlockNumber) -> Signer {
        match self.chain_id(number) {
            Some(chain_id) => Signer::ChainId(chain_id),
            None => Signer::Basic,
        }
    }

    /// The block reward schedule at `number`.
    pub fn reward_schedule(&self, number: BlockNumber) -> RewardSchedule {
        match self.get_feature(number, FeatureKind::Reward) {
            Some((ForkFeature::Reward(RewardFeature::Ecip1017 { era_length }), _)) => {
                RewardSchedule::Ecip1017 { era_length: *era_length }
            }
            _ => RewardSchedule::Constant,
        }
    }

    /// Checks `header` against required-hash checkpoints and the known-bad
    /// list.
    pub fn header_check(&self, header: &SealedHeader) -> Result<(), CheckpointError> {
        for fork in &self.forks {
            if fork.block == header.number {
                if let Some(expected) = fork.required_hash {
                    if expected != header.hash() {
                        return Err(CheckpointError::ForkRequiredHash {
                            number: header.number,
                            expected,
                            got: header.hash(),
                        });
                    }
                }
            }
        }
        for bad in &self.bad_hashes {
            if bad.block == header.number && bad.hash == header.hash() {
                return Err(CheckpointError::BadHash { number: bad.block, hash: bad.hash });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    identity: String,
    network: u64,
    consensus: ConsensusEngine,
    genesis: GenesisDump,
    #[serde(rename = "chainConfig")]
    chain_config: Option<RawChainConfig>,
    #[serde(default)]
    bootstrap: Vec<String>,
    #[serde(default)]
    state: Option<RawStateConfig>,
}

#[derive(Debug, Deserialize)]
struct RawChainConfig {
    #[serde(default)]
    forks: Vec<RawFork>,
    #[serde(rename = "badHashes", default)]
    bad_hashes: Vec<BadHash>,
}

#[derive(Debug, Deserialize)]
struct RawStateConfig {
    #[serde(rename = "startingNonce", default)]
    starting_nonce: Option<u64>,
}

/// Builder assembling a [`ChainSpec`] in code, primarily for tests and
/// embedded network definitions.
#[derive(Debug, Clone)]
pub struct ChainSpecBuilder {
    identity: String,
    network: u64,
    consensus: ConsensusEngine,
    genesis: GenesisDump,
    forks: Vec<Fork>,
    bad_hashes: Vec<BadHash>,
    starting_nonce: u64,
}

impl ChainSpecBuilder {
    /// Starts a builder for a test network with the given genesis dump.
    pub fn new(identity: impl Into<String>, network: u64, genesis: GenesisDump) -> Self {
        Self {
            identity: identity.into(),
            network,
            consensus: ConsensusEngine::EthashTest,
            genesis,
            forks: Vec::new(),
            bad_hashes: Vec::new(),
            starting_nonce: 0,
        }
    }

    /// Uses the real sealing engine.
    pub fn ethash(mut self) -> Self {
        self.consensus = ConsensusEngine::Ethash;
        self
    }

    /// Adds a fork.
    pub fn with_fork(
        mut self,
        name: &str,
        block: BlockNumber,
        features: Vec<ForkFeature>,
    ) -> Self {
        self.forks.push(Fork { name: name.to_owned(), block, required_hash: None, features });
        self
    }

    /// Adds a fork carrying a required-hash checkpoint.
    pub fn with_checkpoint_fork(
        mut self,
        name: &str,
        block: BlockNumber,
        required_hash: emerald_primitives::B256,
        features: Vec<ForkFeature>,
    ) -> Self {
        self.forks.push(Fork {
            name: name.to_owned(),
            block,
            required_hash: Some(required_hash),
            features,
        });
        self
    }

    /// Adds a known-bad hash.
    pub fn with_bad_hash(mut self, bad: BadHash) -> Self {
        self.bad_hashes.push(bad);
        self
    }

    /// Overrides the nonce assigned to new accounts.
    pub fn with_starting_nonce(mut self, nonce: u64) -> Self {
        self.starting_nonce = nonce;
        self
    }

    /// Finishes the spec. At least one fork must have been added.
    pub fn build(self) -> ChainSpec {
        let mut forks = self.forks;
        assert!(!forks.is_empty(), "a chain spec needs at least one fork");
        forks.sort_by_key(|fork| fork.block);
        ChainSpec {
            identity: self.identity,
            network: self.network,
            consensus: self.consensus,
            genesis: self.genesis,
            forks,
            bad_hashes: self.bad_hashes,
            bootstrap: Vec::new(),
            starting_nonce: self.starting_nonce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use emerald_primitives::{Header, B256, U256};

    fn spec() -> ChainSpec {
        ChainSpecBuilder::new("unittest", 62, GenesisDump::default())
            .with_fork("Frontier", 0, vec![])
            .with_fork(
                "Homestead",
                1_150_000,
                vec![
                    ForkFeature::Difficulty(DifficultyFeature::Homestead),
                    ForkFeature::GasTable(GasTableFeature::Homestead),
                ],
            )
            .with_fork(
                "GasReprice",
                2_500_000,
                vec![ForkFeature::GasTable(GasTableFeature::Eip150)],
            )
            .with_fork(
                "Diehard",
                3_000_000,
                vec![
                    ForkFeature::Difficulty(DifficultyFeature::Ecip1010 { length: 2_000_000 }),
                    ForkFeature::GasTable(GasTableFeature::Eip160),
                    ForkFeature::Eip155(Eip155Feature { chain_id: 61 }),
                ],
            )
            .with_fork(
                "Gotham",
                5_000_000,
                vec![ForkFeature::Reward(RewardFeature::Ecip1017 { era_length: 5_000_000 })],
            )
            .build()
    }

    #[test]
    fn feature_lookup_picks_the_latest_declaring_fork() {
        let spec = spec();

        let (feature, fork) = spec.get_feature(2_600_000, FeatureKind::GasTable).unwrap();
        assert_matches!(feature, ForkFeature::GasTable(GasTableFeature::Eip150));
        assert_eq!(fork.name, "GasReprice");

        // an earlier fork still answers for heights before the upgrade
        let (feature, fork) = spec.get_feature(1_200_000, FeatureKind::GasTable).unwrap();
        assert_matches!(feature, ForkFeature::GasTable(GasTableFeature::Homestead));
        assert_eq!(fork.name, "Homestead");

        assert!(spec.get_feature(10, FeatureKind::GasTable).is_none());
    }

    #[test]
    fn difficulty_algorithm_dispatch() {
        let spec = spec();
        assert_eq!(spec.difficulty_algorithm(0), DifficultyAlgorithm::Frontier);
        assert_eq!(spec.difficulty_algorithm(1_150_000), DifficultyAlgorithm::Homestead);
        assert_eq!(
            spec.difficulty_algorithm(3_000_000),
            DifficultyAlgorithm::Ecip1010Pause { fork_block: 3_000_000 }
        );
        // explosion boundary is fork.block + length
        assert_eq!(
            spec.difficulty_algorithm(4_999_999),
            DifficultyAlgorithm::Ecip1010Pause { fork_block: 3_000_000 }
        );
        assert_eq!(
            spec.difficulty_algorithm(5_000_000),
            DifficultyAlgorithm::Ecip1010Explosion {
                fork_block: 3_000_000,
                explosion_block: 5_000_000
            }
        );
    }

    #[test]
    fn signer_and_rewards_follow_features() {
        let spec = spec();
        assert_eq!(spec.chain_id(2_999_999), None);
        assert_eq!(spec.signer(2_999_999), Signer::Basic);
        assert_eq!(spec.signer(3_000_000), Signer::ChainId(61));

        assert_eq!(spec.reward_schedule(4_999_999), RewardSchedule::Constant);
        assert_eq!(
            spec.reward_schedule(5_000_000),
            RewardSchedule::Ecip1017 { era_length: 5_000_000 }
        );
    }

    #[test]
    fn header_check_enforces_checkpoints_and_bad_hashes() {
        let checkpoint = B256::repeat_byte(0xcc);
        let bad = B256::repeat_byte(0xbb);
        let spec = ChainSpecBuilder::new("unittest", 62, GenesisDump::default())
            .with_checkpoint_fork("Diehard", 10, checkpoint, vec![])
            .with_bad_hash(BadHash { block: 12, hash: bad })
            .build();

        let at_fork = Header { number: 10, ..Default::default() }.seal(checkpoint);
        assert!(spec.header_check(&at_fork).is_ok());

        let wrong = Header { number: 10, ..Default::default() }.seal(B256::repeat_byte(1));
        assert_matches!(
            spec.header_check(&wrong),
            Err(CheckpointError::ForkRequiredHash { number: 10, .. })
        );

        let banned = Header { number: 12, ..Default::default() }.seal(bad);
        assert_matches!(spec.header_check(&banned), Err(CheckpointError::BadHash { .. }));

        // same hash at a different height stays acceptable
        let elsewhere = Header { number: 13, ..Default::default() }.seal(bad);
        assert!(spec.header_check(&elsewhere).is_ok());
    }

    #[test]
    fn load_json_parses_a_full_document() {
        let spec = ChainSpec::load_json(
            r#"{
                "identity": "morden-test",
                "network": 62,
                "consensus": "ethash-test",
                "genesis": {
                    "nonce": "0x0000000000000042",
                    "gasLimit": "0x1388",
                    "difficulty": "0x20000"
                },
                "chainConfig": {
                    "forks": [
                        {
                            "name": "Diehard",
                            "block": 500000,
                            "requiredHash": "0x0000000000000000000000000000000000000000000000000000000000000bbb",
                            "features": [
                                { "id": "eip155", "options": { "chainID": 62 } },
                                { "id": "difficulty", "options": { "type": "ecip1010", "length": 2000000 } }
                            ]
                        },
                        { "name": "Frontier", "block": 0, "features": [] }
                    ],
                    "badHashes": [
                        { "block": 10, "hash": "0x0000000000000000000000000000000000000000000000000000000000000aaa" }
                    ]
                },
                "bootstrap": ["enode://aa@1.2.3.4:30303"]
            }"#,
        )
        .unwrap();

        // forks get sorted by activation height at load
        assert_eq!(spec.forks()[0].name, "Frontier");
        assert_eq!(spec.forks()[1].block, 500_000);
        assert_eq!(spec.bad_hashes().len(), 1);
        assert_eq!(spec.chain_id(500_000), Some(62));
        // identity is morden-like and no explicit nonce was given
        assert_eq!(spec.starting_nonce, 0x100000);
        assert_eq!(spec.genesis.difficulty, U256::from(0x20000u64));
    }

    #[test]
    fn load_json_rejects_missing_forks() {
        let doc = r#"{
            "identity": "x", "network": 1, "consensus": "ethash",
            "genesis": { "gasLimit": "0x1388", "difficulty": "0x20000" }
        }"#;
        assert_matches!(ChainSpec::load_json(doc), Err(SpecError::NoForks));
    }
}
