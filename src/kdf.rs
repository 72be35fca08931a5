use hmac::Hmac;
use pbkdf2::pbkdf2;
use ripemd::Ripemd160;
use sha2::Sha512;
use streebog::Streebog512;
use whirlpool::Whirlpool;

use crate::error::{Error, Result};

/// Hash function underlying a PBKDF2 key-derivation variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HashFunction {
    Sha512,
    Whirlpool,
    Ripemd160,
    Streebog,
}

/// PBKDF2 key derivation, parameterized by hash and by TrueCrypt-compat
/// mode. TrueCrypt volumes use fixed low iteration counts and ignore the
/// PIM; VeraCrypt volumes scale iterations with the PIM.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pkcs5Kdf {
    hash: HashFunction,
    truecrypt: bool,
}

impl Pkcs5Kdf {
    pub fn new(hash: HashFunction) -> Self {
        Pkcs5Kdf {
            hash,
            truecrypt: false,
        }
    }

    pub fn new_truecrypt(hash: HashFunction) -> Self {
        Pkcs5Kdf {
            hash,
            truecrypt: true,
        }
    }

    pub fn hash(&self) -> HashFunction {
        self.hash
    }

    pub fn name(&self) -> &'static str {
        match self.hash {
            HashFunction::Sha512 => "HMAC-SHA-512",
            HashFunction::Whirlpool => "HMAC-Whirlpool",
            HashFunction::Ripemd160 => "HMAC-RIPEMD-160",
            HashFunction::Streebog => "HMAC-Streebog",
        }
    }

    /// Iteration count for the given PIM.
    pub fn iteration_count(&self, pim: u32) -> u32 {
        if self.truecrypt {
            return match self.hash {
                HashFunction::Ripemd160 => 2000,
                _ => 1000,
            };
        }
        if pim == 0 {
            match self.hash {
                HashFunction::Ripemd160 => 655_331,
                _ => 500_000,
            }
        } else {
            15_000 + pim * 1000
        }
    }

    /// Derives a header key into `key`, filling it exactly. The caller
    /// sizes the output to the largest serialized key it may need.
    pub fn derive_key(&self, key: &mut [u8], password: &[u8], pim: u32, salt: &[u8]) -> Result<()> {
        if password.is_empty() {
            return Err(Error::PasswordEmpty);
        }
        let iterations = self.iteration_count(pim);
        let result = match self.hash {
            HashFunction::Sha512 => pbkdf2::<Hmac<Sha512>>(password, salt, iterations, key),
            HashFunction::Whirlpool => pbkdf2::<Hmac<Whirlpool>>(password, salt, iterations, key),
            HashFunction::Ripemd160 => pbkdf2::<Hmac<Ripemd160>>(password, salt, iterations, key),
            HashFunction::Streebog => pbkdf2::<Hmac<Streebog512>>(password, salt, iterations, key),
        };
        result.map_err(|_| Error::ParameterIncorrect("derived key length"))
    }
}

/// Available KDFs in trial order. Streebog never shipped in TrueCrypt and
/// is absent from the compat list.
pub fn available_kdfs(truecrypt: bool) -> Vec<Pkcs5Kdf> {
    if truecrypt {
        vec![
            Pkcs5Kdf::new_truecrypt(HashFunction::Sha512),
            Pkcs5Kdf::new_truecrypt(HashFunction::Whirlpool),
            Pkcs5Kdf::new_truecrypt(HashFunction::Ripemd160),
        ]
    } else {
        vec![
            Pkcs5Kdf::new(HashFunction::Sha512),
            Pkcs5Kdf::new(HashFunction::Whirlpool),
            Pkcs5Kdf::new(HashFunction::Ripemd160),
            Pkcs5Kdf::new(HashFunction::Streebog),
        ]
    }
}
