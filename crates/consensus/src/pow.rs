use crate::ConsensusError;
use emerald_primitives::SealedHeader;

/// Verifies the proof-of-work seal of a header.
///
/// The real ethash verifier lives outside the chain core; the core only
/// dispatches to this interface.
pub trait PowVerifier: Send + Sync + std::fmt::Debug {
    /// Checks the seal of `header`, returning
    /// [`ConsensusError::InvalidPowNonce`] on failure.
    fn verify_seal(&self, header: &SealedHeader) -> Result<(), ConsensusError>;
}

/// Seal verifier that accepts everything, used by `ethash-test` networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPow;

impl PowVerifier for NoopPow {
    fn verify_seal(&self, _header: &SealedHeader) -> Result<(), ConsensusError> {
        Ok(())
    }
}
