use aes::Aes256;
use camellia::Camellia256;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use kuznyechik::Kuznyechik;
use serpent::Serpent;
use twofish::Twofish;
use xts_mode::{get_tweak_default, Xts128};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Key size of every supported primitive cipher, in bytes.
pub const CIPHER_KEY_SIZE: usize = 32;
/// Block size of every supported primitive cipher, in bytes.
pub const CIPHER_BLOCK_SIZE: usize = 16;
/// Key size of the LRW tweak key (one cipher block).
const LRW_KEY_SIZE: usize = 16;

fn keyed<C: KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| Error::ParameterIncorrect("cipher key length"))
}

/// Identifies one primitive block cipher. All supported primitives use
/// 256-bit keys and 128-bit blocks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cipher {
    Aes,
    Serpent,
    Twofish,
    Camellia,
    Kuznyechik,
}

/// A primitive cipher with its key schedule expanded.
enum KeyedCipher {
    Aes(Aes256),
    Serpent(Serpent),
    Twofish(Twofish),
    Camellia(Camellia256),
    Kuznyechik(Kuznyechik),
}

impl KeyedCipher {
    fn new(cipher: Cipher, key: &[u8]) -> Result<Self> {
        Ok(match cipher {
            Cipher::Aes => KeyedCipher::Aes(keyed(key)?),
            Cipher::Serpent => KeyedCipher::Serpent(keyed(key)?),
            Cipher::Twofish => KeyedCipher::Twofish(keyed(key)?),
            Cipher::Camellia => KeyedCipher::Camellia(keyed(key)?),
            Cipher::Kuznyechik => KeyedCipher::Kuznyechik(keyed(key)?),
        })
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            KeyedCipher::Aes(c) => c.encrypt_block(block),
            KeyedCipher::Serpent(c) => c.encrypt_block(block),
            KeyedCipher::Twofish(c) => c.encrypt_block(block),
            KeyedCipher::Camellia(c) => c.encrypt_block(block),
            KeyedCipher::Kuznyechik(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            KeyedCipher::Aes(c) => c.decrypt_block(block),
            KeyedCipher::Serpent(c) => c.decrypt_block(block),
            KeyedCipher::Twofish(c) => c.decrypt_block(block),
            KeyedCipher::Camellia(c) => c.decrypt_block(block),
            KeyedCipher::Kuznyechik(c) => c.decrypt_block(block),
        }
    }
}

/// One XTS instance of a concrete cipher, holding the primary and tweak
/// key schedules for a single cascade member.
enum XtsUnit {
    Aes(Xts128<Aes256>),
    Serpent(Xts128<Serpent>),
    Twofish(Xts128<Twofish>),
    Camellia(Xts128<Camellia256>),
    Kuznyechik(Xts128<Kuznyechik>),
}

impl XtsUnit {
    fn new(cipher: Cipher, primary: &[u8], tweak: &[u8]) -> Result<Self> {
        Ok(match cipher {
            Cipher::Aes => XtsUnit::Aes(Xts128::new(keyed(primary)?, keyed(tweak)?)),
            Cipher::Serpent => XtsUnit::Serpent(Xts128::new(keyed(primary)?, keyed(tweak)?)),
            Cipher::Twofish => XtsUnit::Twofish(Xts128::new(keyed(primary)?, keyed(tweak)?)),
            Cipher::Camellia => XtsUnit::Camellia(Xts128::new(keyed(primary)?, keyed(tweak)?)),
            Cipher::Kuznyechik => {
                XtsUnit::Kuznyechik(Xts128::new(keyed(primary)?, keyed(tweak)?))
            }
        })
    }

    fn encrypt_area(&self, data: &mut [u8], sector_size: usize, first_data_unit: u128) {
        match self {
            XtsUnit::Aes(x) => x.encrypt_area(data, sector_size, first_data_unit, get_tweak_default),
            XtsUnit::Serpent(x) => {
                x.encrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Twofish(x) => {
                x.encrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Camellia(x) => {
                x.encrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Kuznyechik(x) => {
                x.encrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
        }
    }

    fn decrypt_area(&self, data: &mut [u8], sector_size: usize, first_data_unit: u128) {
        match self {
            XtsUnit::Aes(x) => x.decrypt_area(data, sector_size, first_data_unit, get_tweak_default),
            XtsUnit::Serpent(x) => {
                x.decrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Twofish(x) => {
                x.decrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Camellia(x) => {
                x.decrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
            XtsUnit::Kuznyechik(x) => {
                x.decrypt_area(data, sector_size, first_data_unit, get_tweak_default)
            }
        }
    }
}

/// LRW engine: a single keyed cipher plus the 16-byte GF(2^128) tweak key.
struct LrwEngine {
    cipher: KeyedCipher,
    tweak_key: Zeroizing<[u8; 16]>,
}

fn gf128_double(block: &mut [u8; 16]) {
    let mut carry = 0u8;
    for b in block.iter_mut().rev() {
        let msb = *b >> 7;
        *b = (*b << 1) | carry;
        carry = msb;
    }
    if carry != 0 {
        block[15] ^= 0x87;
    }
}

impl LrwEngine {
    /// Tweak for one block: the tweak key multiplied by the block index in
    /// GF(2^128), double-and-add over the index bits.
    fn tweak_for(&self, block_index: u64) -> [u8; 16] {
        let mut acc = [0u8; 16];
        let mut cur = *self.tweak_key;
        let mut i = block_index;
        while i != 0 {
            if i & 1 == 1 {
                for (a, c) in acc.iter_mut().zip(cur.iter()) {
                    *a ^= c;
                }
            }
            gf128_double(&mut cur);
            i >>= 1;
        }
        acc
    }

    fn process(&self, data: &mut [u8], first_block: u64, encrypt: bool) -> Result<()> {
        if data.len() % CIPHER_BLOCK_SIZE != 0 {
            return Err(Error::ParameterIncorrect("LRW data must be whole blocks"));
        }
        for (i, block) in data.chunks_exact_mut(CIPHER_BLOCK_SIZE).enumerate() {
            let tweak = self.tweak_for(first_block + i as u64);
            for (b, t) in block.iter_mut().zip(tweak.iter()) {
                *b ^= t;
            }
            if encrypt {
                self.cipher.encrypt_block(block);
            } else {
                self.cipher.decrypt_block(block);
            }
            for (b, t) in block.iter_mut().zip(tweak.iter()) {
                *b ^= t;
            }
        }
        Ok(())
    }
}

/// Encryption mode, tagged by kind so the header key layout is a pattern
/// match rather than a runtime type test. `get_new` yields a fresh unkeyed
/// instance of the same tag.
#[derive(Clone)]
pub enum EncryptionMode {
    Xts(XtsModeKey),
    Lrw(LrwModeKey),
}

#[derive(Clone, Default)]
pub struct XtsModeKey {
    secondary_key: Option<Zeroizing<Vec<u8>>>,
}

#[derive(Clone, Default)]
pub struct LrwModeKey {
    tweak_key: Option<Zeroizing<Vec<u8>>>,
}

impl EncryptionMode {
    pub fn new_xts() -> Self {
        EncryptionMode::Xts(XtsModeKey::default())
    }

    pub fn new_lrw() -> Self {
        EncryptionMode::Lrw(LrwModeKey::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            EncryptionMode::Xts(_) => "XTS",
            EncryptionMode::Lrw(_) => "LRW",
        }
    }

    pub fn is_xts(&self) -> bool {
        matches!(self, EncryptionMode::Xts(_))
    }

    /// Mode key size in bytes. The XTS secondary key mirrors the bound
    /// algorithm's key and is sized by `set_key`; unkeyed XTS reports zero.
    pub fn key_size(&self) -> usize {
        match self {
            EncryptionMode::Xts(m) => m.secondary_key.as_ref().map_or(0, |k| k.len()),
            EncryptionMode::Lrw(_) => LRW_KEY_SIZE,
        }
    }

    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        match self {
            EncryptionMode::Xts(m) => {
                if key.is_empty() || key.len() % CIPHER_KEY_SIZE != 0 {
                    return Err(Error::ParameterIncorrect("XTS secondary key length"));
                }
                m.secondary_key = Some(Zeroizing::new(key.to_vec()));
            }
            EncryptionMode::Lrw(m) => {
                if key.len() != LRW_KEY_SIZE {
                    return Err(Error::ParameterIncorrect("LRW tweak key length"));
                }
                m.tweak_key = Some(Zeroizing::new(key.to_vec()));
            }
        }
        Ok(())
    }

    /// Fresh unkeyed instance of the same mode.
    pub fn get_new(&self) -> Self {
        match self {
            EncryptionMode::Xts(_) => EncryptionMode::new_xts(),
            EncryptionMode::Lrw(_) => EncryptionMode::new_lrw(),
        }
    }

    fn key(&self) -> Result<&[u8]> {
        let key = match self {
            EncryptionMode::Xts(m) => m.secondary_key.as_ref(),
            EncryptionMode::Lrw(m) => m.tweak_key.as_ref(),
        };
        key.map(|k| k.as_slice())
            .ok_or(Error::ParameterIncorrect("mode key not set"))
    }
}

/// The encryption algorithm catalog: single ciphers and the cascade
/// combinations. Cascade members are listed in decryption order;
/// encryption applies them in reverse.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EaKind {
    Aes,
    Serpent,
    Twofish,
    Camellia,
    Kuznyechik,
    AesTwofish,
    AesTwofishSerpent,
    SerpentAes,
    SerpentTwofishAes,
    TwofishSerpent,
    CamelliaKuznyechik,
    CamelliaSerpent,
    KuznyechikAes,
    KuznyechikSerpentCamellia,
    KuznyechikTwofish,
}

impl EaKind {
    fn ciphers(self) -> &'static [Cipher] {
        match self {
            EaKind::Aes => &[Cipher::Aes],
            EaKind::Serpent => &[Cipher::Serpent],
            EaKind::Twofish => &[Cipher::Twofish],
            EaKind::Camellia => &[Cipher::Camellia],
            EaKind::Kuznyechik => &[Cipher::Kuznyechik],
            EaKind::AesTwofish => &[Cipher::Aes, Cipher::Twofish],
            EaKind::AesTwofishSerpent => &[Cipher::Aes, Cipher::Twofish, Cipher::Serpent],
            EaKind::SerpentAes => &[Cipher::Serpent, Cipher::Aes],
            EaKind::SerpentTwofishAes => &[Cipher::Serpent, Cipher::Twofish, Cipher::Aes],
            EaKind::TwofishSerpent => &[Cipher::Twofish, Cipher::Serpent],
            EaKind::CamelliaKuznyechik => &[Cipher::Camellia, Cipher::Kuznyechik],
            EaKind::CamelliaSerpent => &[Cipher::Camellia, Cipher::Serpent],
            EaKind::KuznyechikAes => &[Cipher::Kuznyechik, Cipher::Aes],
            EaKind::KuznyechikSerpentCamellia => {
                &[Cipher::Kuznyechik, Cipher::Serpent, Cipher::Camellia]
            }
            EaKind::KuznyechikTwofish => &[Cipher::Kuznyechik, Cipher::Twofish],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EaKind::Aes => "AES",
            EaKind::Serpent => "Serpent",
            EaKind::Twofish => "Twofish",
            EaKind::Camellia => "Camellia",
            EaKind::Kuznyechik => "Kuznyechik",
            EaKind::AesTwofish => "AES-Twofish",
            EaKind::AesTwofishSerpent => "AES-Twofish-Serpent",
            EaKind::SerpentAes => "Serpent-AES",
            EaKind::SerpentTwofishAes => "Serpent-Twofish-AES",
            EaKind::TwofishSerpent => "Twofish-Serpent",
            EaKind::CamelliaKuznyechik => "Camellia-Kuznyechik",
            EaKind::CamelliaSerpent => "Camellia-Serpent",
            EaKind::KuznyechikAes => "Kuznyechik-AES",
            EaKind::KuznyechikSerpentCamellia => "Kuznyechik-Serpent-Camellia",
            EaKind::KuznyechikTwofish => "Kuznyechik-Twofish",
        }
    }
}

enum ModeEngine {
    Xts(Vec<XtsUnit>),
    Lrw(LrwEngine),
}

/// An encryption algorithm instance: unkeyed when enumerated from the
/// catalog, keyed and mode-bound by the header codec before use.
pub struct EncryptionAlgorithm {
    kind: EaKind,
    primary_key: Option<Zeroizing<Vec<u8>>>,
    mode: Option<EncryptionMode>,
    engine: Option<ModeEngine>,
}

impl EncryptionAlgorithm {
    pub fn new(kind: EaKind) -> Self {
        EncryptionAlgorithm {
            kind,
            primary_key: None,
            mode: None,
            engine: None,
        }
    }

    pub fn kind(&self) -> EaKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Total key size: the sum over cascade members.
    pub fn key_size(&self) -> usize {
        self.kind.ciphers().len() * CIPHER_KEY_SIZE
    }

    pub fn block_size(&self) -> usize {
        CIPHER_BLOCK_SIZE
    }

    /// Fresh unkeyed instance of the same algorithm.
    pub fn get_new(&self) -> Self {
        EncryptionAlgorithm::new(self.kind)
    }

    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size() {
            return Err(Error::ParameterIncorrect("encryption algorithm key length"));
        }
        self.primary_key = Some(Zeroizing::new(key.to_vec()));
        self.engine = None;
        Ok(())
    }

    /// Legacy modes shipped only with the single-cipher TrueCrypt-era
    /// algorithms; every algorithm supports XTS.
    pub fn is_mode_supported(&self, mode: &EncryptionMode) -> bool {
        match mode {
            EncryptionMode::Xts(_) => true,
            EncryptionMode::Lrw(_) => {
                matches!(self.kind, EaKind::Aes | EaKind::Serpent | EaKind::Twofish)
            }
        }
    }

    /// Binds a keyed mode to this keyed algorithm and expands the cipher
    /// engines. The XTS secondary key must match the algorithm key size.
    pub fn set_mode(&mut self, mode: EncryptionMode) -> Result<()> {
        if !self.is_mode_supported(&mode) {
            return Err(Error::ParameterIncorrect("mode not supported by algorithm"));
        }
        let primary = self
            .primary_key
            .as_ref()
            .ok_or(Error::ParameterIncorrect("algorithm key not set"))?;

        let engine = match &mode {
            EncryptionMode::Xts(_) => {
                let secondary = mode.key()?;
                if secondary.len() != primary.len() {
                    return Err(Error::ParameterIncorrect("XTS secondary key length"));
                }
                let mut units = Vec::with_capacity(self.kind.ciphers().len());
                for (i, &cipher) in self.kind.ciphers().iter().enumerate() {
                    let at = i * CIPHER_KEY_SIZE;
                    units.push(XtsUnit::new(
                        cipher,
                        &primary[at..at + CIPHER_KEY_SIZE],
                        &secondary[at..at + CIPHER_KEY_SIZE],
                    )?);
                }
                ModeEngine::Xts(units)
            }
            EncryptionMode::Lrw(_) => {
                let tweak = mode.key()?;
                let mut tweak_key = Zeroizing::new([0u8; 16]);
                tweak_key.copy_from_slice(tweak);
                ModeEngine::Lrw(LrwEngine {
                    cipher: KeyedCipher::new(self.kind.ciphers()[0], primary)?,
                    tweak_key,
                })
            }
        };

        self.engine = Some(engine);
        self.mode = Some(mode);
        Ok(())
    }

    pub fn mode(&self) -> Option<&EncryptionMode> {
        self.mode.as_ref()
    }

    fn engine(&self) -> Result<&ModeEngine> {
        self.engine
            .as_ref()
            .ok_or(Error::ParameterIncorrect("encryption mode not set"))
    }

    /// Encrypts the whole buffer as data unit zero.
    pub fn encrypt(&self, data: &mut [u8]) -> Result<()> {
        match self.engine()? {
            ModeEngine::Xts(units) => {
                for unit in units.iter().rev() {
                    unit.encrypt_area(data, data.len(), 0);
                }
                Ok(())
            }
            ModeEngine::Lrw(lrw) => lrw.process(data, 1, true),
        }
    }

    /// Decrypts the whole buffer as data unit zero.
    pub fn decrypt(&self, data: &mut [u8]) -> Result<()> {
        match self.engine()? {
            ModeEngine::Xts(units) => {
                for unit in units.iter() {
                    unit.decrypt_area(data, data.len(), 0);
                }
                Ok(())
            }
            ModeEngine::Lrw(lrw) => lrw.process(data, 1, false),
        }
    }

    pub fn encrypt_sectors(
        &self,
        data: &mut [u8],
        first_data_unit: u64,
        sector_size: usize,
    ) -> Result<()> {
        check_sectors(data, sector_size)?;
        match self.engine()? {
            ModeEngine::Xts(units) => {
                for unit in units.iter().rev() {
                    unit.encrypt_area(data, sector_size, first_data_unit as u128);
                }
                Ok(())
            }
            ModeEngine::Lrw(lrw) => {
                let blocks = (sector_size / CIPHER_BLOCK_SIZE) as u64;
                lrw.process(data, first_data_unit * blocks + 1, true)
            }
        }
    }

    pub fn decrypt_sectors(
        &self,
        data: &mut [u8],
        first_data_unit: u64,
        sector_size: usize,
    ) -> Result<()> {
        check_sectors(data, sector_size)?;
        match self.engine()? {
            ModeEngine::Xts(units) => {
                for unit in units.iter() {
                    unit.decrypt_area(data, sector_size, first_data_unit as u128);
                }
                Ok(())
            }
            ModeEngine::Lrw(lrw) => {
                let blocks = (sector_size / CIPHER_BLOCK_SIZE) as u64;
                lrw.process(data, first_data_unit * blocks + 1, false)
            }
        }
    }
}

fn check_sectors(data: &[u8], sector_size: usize) -> Result<()> {
    if sector_size == 0 || data.len() % sector_size != 0 {
        return Err(Error::ParameterIncorrect("data is not whole sectors"));
    }
    Ok(())
}

/// All supported algorithms, in trial order.
pub fn available_algorithms() -> Vec<EncryptionAlgorithm> {
    [
        EaKind::Aes,
        EaKind::Serpent,
        EaKind::Twofish,
        EaKind::Camellia,
        EaKind::Kuznyechik,
        EaKind::AesTwofish,
        EaKind::AesTwofishSerpent,
        EaKind::SerpentAes,
        EaKind::SerpentTwofishAes,
        EaKind::TwofishSerpent,
        EaKind::CamelliaKuznyechik,
        EaKind::CamelliaSerpent,
        EaKind::KuznyechikAes,
        EaKind::KuznyechikSerpentCamellia,
        EaKind::KuznyechikTwofish,
    ]
    .into_iter()
    .map(EncryptionAlgorithm::new)
    .collect()
}

/// All supported modes, in trial order. XTS first; LRW covers the legacy
/// TrueCrypt key layout.
pub fn available_modes() -> Vec<EncryptionMode> {
    vec![EncryptionMode::new_xts(), EncryptionMode::new_lrw()]
}

/// Largest algorithm key size in the given list.
pub fn largest_key_size(algorithms: &[EncryptionAlgorithm]) -> usize {
    algorithms.iter().map(|ea| ea.key_size()).max().unwrap_or(0)
}
