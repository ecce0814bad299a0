//! Random salt generation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Minimum number of random bytes in a salt.
pub const MIN_SALT_BYTES: usize = 10;

/// Maximum number of random bytes in a salt.
pub const MAX_SALT_BYTES: usize = 15;

/// Returns the base64 encoding of 10 to 15 random bytes, the length drawn
/// uniformly per call.
pub fn generate_salt() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(MIN_SALT_BYTES..=MAX_SALT_BYTES);
    let mut bytes = vec![0u8; len];
    rng.fill(bytes.as_mut_slice());
    STANDARD.encode(&bytes)
}

/// Independent salts for the key and the IV of one encryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaltPair {
    pub key_salt: String,
    pub iv_salt: String,
}

impl SaltPair {
    pub fn generate() -> Self {
        Self {
            key_salt: generate_salt(),
            iv_salt: generate_salt(),
        }
    }

    /// Wire order: `[key_salt, iv_salt]`.
    pub fn into_array(self) -> [String; 2] {
        [self.key_salt, self.iv_salt]
    }

    pub fn from_array([key_salt, iv_salt]: [String; 2]) -> Self {
        Self { key_salt, iv_salt }
    }
}

pub fn generate_salt_pair() -> SaltPair {
    SaltPair::generate()
}
