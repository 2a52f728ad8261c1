//! Argon2id key derivation and parameter marshaling.
//!
//! The derivation parameters (salt + cost) are stored alongside the
//! data they protect, so a later process can re-derive the same key
//! from the same password. They are not secret.
//!
//! Marshaled parameter format (29 bytes, fixed width):
//!   [ version (1 byte, = 1) | salt (16) | m_cost (4 LE) |
//!     t_cost (4 LE) | p_cost (4 LE) ]

use argon2::{Argon2, Params, Version};
use rand::RngCore;

use crate::error::CryptoError;

/// Length of the salt stored in [`KdfParams`].
pub const SALT_LEN: usize = 16;

/// Length of a marshaled [`KdfParams`] blob.
pub const PARAMS_LEN: usize = 1 + SALT_LEN + 4 + 4 + 4;

const PARAMS_VERSION: u8 = 1;

/// Tunable Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfCost {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfCost {
    /// Tuned for interactive use: 64 MiB, 3 iterations, 1 lane.
    fn default() -> Self {
        Self {
            m_cost: 64 * 1024,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// Salt plus cost: everything needed to turn a password back into the
/// same 32-byte key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: [u8; SALT_LEN],
    pub cost: KdfCost,
}

impl KdfParams {
    /// Fresh random salt with the given cost.
    pub fn generate(cost: KdfCost) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self { salt, cost }
    }

    /// Marshal into the fixed 29-byte storage format.
    pub fn marshal(&self) -> [u8; PARAMS_LEN] {
        let mut out = [0u8; PARAMS_LEN];
        out[0] = PARAMS_VERSION;
        out[1..17].copy_from_slice(&self.salt);
        out[17..21].copy_from_slice(&self.cost.m_cost.to_le_bytes());
        out[21..25].copy_from_slice(&self.cost.t_cost.to_le_bytes());
        out[25..29].copy_from_slice(&self.cost.p_cost.to_le_bytes());
        out
    }

    /// Unmarshal from the storage format. Rejects any blob whose
    /// length or version byte differs.
    pub fn unmarshal(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != PARAMS_LEN || data[0] != PARAMS_VERSION {
            return Err(CryptoError::MalformedParams);
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[1..17]);
        let cost = KdfCost {
            m_cost: u32::from_le_bytes([data[17], data[18], data[19], data[20]]),
            t_cost: u32::from_le_bytes([data[21], data[22], data[23], data[24]]),
            p_cost: u32::from_le_bytes([data[25], data[26], data[27], data[28]]),
        };
        Ok(Self { salt, cost })
    }
}

/// Derive the 32-byte key for `password` under `params`.
///
/// Deterministic: same password + same params = same key.
pub fn derive_key(password: &[u8], params: &KdfParams) -> Result<[u8; 32], CryptoError> {
    let argon_params = Params::new(
        params.cost.m_cost,
        params.cost.t_cost,
        params.cost.p_cost,
        Some(32),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, &params.salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap cost so the test suite stays fast.
    const TEST_COST: KdfCost = KdfCost {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    };

    #[test]
    fn derivation_is_deterministic() {
        let params = KdfParams::generate(TEST_COST);
        let a = derive_key(b"hunter2", &params).unwrap();
        let b = derive_key(b"hunter2", &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_password_different_key() {
        let params = KdfParams::generate(TEST_COST);
        let a = derive_key(b"hunter2", &params).unwrap();
        let b = derive_key(b"hunter3", &params).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn marshal_roundtrip() {
        let params = KdfParams::generate(TEST_COST);
        let blob = params.marshal();
        assert_eq!(blob.len(), PARAMS_LEN);
        let back = KdfParams::unmarshal(&blob).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn unmarshal_rejects_wrong_length() {
        let params = KdfParams::generate(TEST_COST);
        let blob = params.marshal();
        assert!(matches!(
            KdfParams::unmarshal(&blob[..PARAMS_LEN - 1]),
            Err(CryptoError::MalformedParams)
        ));
        assert!(matches!(
            KdfParams::unmarshal(&[]),
            Err(CryptoError::MalformedParams)
        ));
    }

    #[test]
    fn unmarshal_rejects_unknown_version() {
        let params = KdfParams::generate(TEST_COST);
        let mut blob = params.marshal();
        blob[0] = 99;
        assert!(matches!(
            KdfParams::unmarshal(&blob),
            Err(CryptoError::MalformedParams)
        ));
    }

    #[test]
    fn zero_cost_rejected() {
        let params = KdfParams {
            salt: [0u8; SALT_LEN],
            cost: KdfCost {
                m_cost: 0,
                t_cost: 0,
                p_cost: 0,
            },
        };
        assert!(derive_key(b"pw", &params).is_err());
    }
}
