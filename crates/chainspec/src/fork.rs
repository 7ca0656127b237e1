use crate::SpecError;
use emerald_primitives::{BlockNumber, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A protocol fork: a named activation height carrying feature variants and
/// an optional required-hash checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fork {
    /// Human-readable fork name.
    pub name: String,
    /// Activation block. Zero activates at genesis.
    pub block: BlockNumber,
    /// If set, the canonical header at `block` must carry exactly this hash.
    pub required_hash: Option<B256>,
    /// Features this fork switches on.
    pub features: Vec<ForkFeature>,
}

impl Fork {
    /// The feature of `kind` declared by this fork, if any.
    pub fn feature(&self, kind: FeatureKind) -> Option<&ForkFeature> {
        self.features.iter().find(|feature| feature.kind() == kind)
    }
}

/// Identifier of a feature family, matching the `id` field of the
/// configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Difficulty recalculation algorithm.
    Difficulty,
    /// Opcode gas schedule.
    GasTable,
    /// Replay-protected transaction signing.
    Eip155,
    /// Block reward schedule.
    Reward,
}

/// A parsed fork feature. The string-keyed option maps of the configuration
/// format exist only in the serde layer; queries hand out these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkFeature {
    /// Selects the difficulty algorithm.
    Difficulty(DifficultyFeature),
    /// Selects the opcode gas schedule.
    GasTable(GasTableFeature),
    /// Enables chain-id-bound transaction signatures.
    Eip155(Eip155Feature),
    /// Selects the block reward schedule.
    Reward(RewardFeature),
}

impl ForkFeature {
    /// The family this feature belongs to.
    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::Difficulty(_) => FeatureKind::Difficulty,
            Self::GasTable(_) => FeatureKind::GasTable,
            Self::Eip155(_) => FeatureKind::Eip155,
            Self::Reward(_) => FeatureKind::Reward,
        }
    }
}

/// Difficulty algorithm options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyFeature {
    /// Homestead difficulty formula.
    Homestead,
    /// ECIP-1010 bomb delay: the bomb freezes at the activation height and
    /// resumes `length` blocks later as if the pause never happened.
    Ecip1010 {
        /// Length of the bomb pause in blocks.
        length: u64,
    },
}

/// Gas schedule options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasTableFeature {
    /// Homestead schedule.
    Homestead,
    /// EIP-150 repricing.
    Eip150,
    /// EIP-160 repricing (EXP byte cost raised).
    Eip160,
}

/// Replay protection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip155Feature {
    /// Chain id bound into protected signatures.
    pub chain_id: u64,
}

/// Reward schedule options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardFeature {
    /// ECIP-1017 era-indexed disinflation.
    Ecip1017 {
        /// Blocks per era.
        era_length: u64,
    },
}

/// A known-invalid block. Headers matching `(number, hash)` are rejected at
/// ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadHash {
    /// Height of the banned block.
    pub block: BlockNumber,
    /// The banned header hash.
    pub hash: B256,
}

/// Wire shape of a fork in the configuration document.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFork {
    pub(crate) name: String,
    pub(crate) block: BlockNumber,
    #[serde(rename = "requiredHash", default)]
    pub(crate) required_hash: Option<B256>,
    #[serde(default)]
    pub(crate) features: Vec<RawFeature>,
}

/// Wire shape of a feature: an id plus a string-keyed option map.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFeature {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) options: serde_json::Map<String, Value>,
}

impl RawFork {
    pub(crate) fn into_fork(self) -> Result<Fork, SpecError> {
        let mut features = Vec::with_capacity(self.features.len());
        for raw in self.features {
            features.push(parse_feature(&self.name, raw)?);
        }
        Ok(Fork { name: self.name, block: self.block, required_hash: self.required_hash, features })
    }
}

fn parse_feature(fork: &str, raw: RawFeature) -> Result<ForkFeature, SpecError> {
    let invalid = |reason: &str| SpecError::InvalidFeature {
        fork: fork.to_owned(),
        id: raw.id.clone(),
        reason: reason.to_owned(),
    };

    match raw.id.as_str() {
        "difficulty" => match option_str(&raw.options, "type") {
            Some("homestead") => Ok(ForkFeature::Difficulty(DifficultyFeature::Homestead)),
            Some("ecip1010") => {
                let length = option_u64(&raw.options, "length")
                    .ok_or_else(|| invalid("ecip1010 difficulty needs a numeric `length`"))?;
                Ok(ForkFeature::Difficulty(DifficultyFeature::Ecip1010 { length }))
            }
            _ => Err(invalid("unknown difficulty type")),
        },
        "gastable" => match option_str(&raw.options, "type") {
            Some("homestead") => Ok(ForkFeature::GasTable(GasTableFeature::Homestead)),
            Some("eip150") => Ok(ForkFeature::GasTable(GasTableFeature::Eip150)),
            Some("eip160") => Ok(ForkFeature::GasTable(GasTableFeature::Eip160)),
            _ => Err(invalid("unknown gastable type")),
        },
        "eip155" => {
            let chain_id = option_u64(&raw.options, "chainID")
                .ok_or_else(|| invalid("eip155 needs a numeric `chainID`"))?;
            Ok(ForkFeature::Eip155(Eip155Feature { chain_id }))
        }
        "reward" => match option_str(&raw.options, "type") {
            Some("ecip1017") => {
                let era_length = option_u64(&raw.options, "era")
                    .ok_or_else(|| invalid("ecip1017 reward needs a numeric `era`"))?;
                if era_length == 0 {
                    return Err(invalid("era length must be positive"));
                }
                Ok(ForkFeature::Reward(RewardFeature::Ecip1017 { era_length }))
            }
            _ => Err(invalid("unknown reward type")),
        },
        _ => Err(invalid("unknown feature id")),
    }
}

fn option_str<'a>(options: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

/// Numeric options may arrive as JSON numbers or decimal strings.
fn option_u64(options: &serde_json::Map<String, Value>, key: &str) -> Option<u64> {
    match options.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
