use std::cmp;
use std::sync::Arc;

use log::{debug, trace};
use zeroize::Zeroizing;

use crate::buffer::SecureBuffer;
use crate::crypto::{self, EncryptionAlgorithm, EncryptionMode};
use crate::endian;
use crate::error::{Error, Result};
use crate::kdf::Pkcs5Kdf;

pub const SALT_OFFSET: usize = 0;
pub const SALT_SIZE: usize = 64;
/// The encrypted region starts right after the cleartext salt.
pub const ENCRYPTED_HEADER_DATA_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
pub const DATA_KEY_AREA_MAX_SIZE: usize = 256;
/// Offset of the data-area key within the decrypted header region.
pub const DATA_AREA_KEY_OFFSET: usize = DATA_KEY_AREA_MAX_SIZE - ENCRYPTED_HEADER_DATA_OFFSET;
/// Offset of the header CRC within the decrypted header region. The CRC
/// covers everything before it.
pub const HEADER_CRC_OFFSET: usize = 252 - ENCRYPTED_HEADER_DATA_OFFSET;
/// Key bytes reserved at the front of the key area for a legacy mode.
pub const LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE: usize = 32;

pub const CURRENT_HEADER_VERSION: u16 = 5;
/// Written as RequiredMinProgramVersion on newly created volumes (BCD).
pub const CURRENT_REQUIRED_MIN_PROGRAM_VERSION: u16 = 0x010B;
/// This implementation's version number (BCD), compared against the
/// header's RequiredMinProgramVersion.
pub const PROGRAM_VERSION_NUMBER: u16 = 0x0126;

const TRUECRYPT_MIN_PROGRAM_VERSION: u16 = 0x0600;
const TRUECRYPT_MAX_PROGRAM_VERSION: u16 = 0x071A;

pub const MIN_VOLUME_SECTOR_SIZE: u32 = 512;
pub const MAX_VOLUME_SECTOR_SIZE: u32 = 4096;
pub const SECTOR_SIZE_LEGACY: u32 = 512;
const ENCRYPTION_DATA_UNIT_SIZE: u32 = 512;

/// Headers below this version are treated as a failed trial, not an error.
/// TrueCrypt 6.0 through 7.1a wrote versions 4 and 5.
fn min_allowed_header_version(truecrypt_mode: bool) -> u16 {
    if truecrypt_mode {
        4
    } else {
        5
    }
}

fn validate_sector_size(sector_size: u32) -> Result<()> {
    if sector_size < MIN_VOLUME_SECTOR_SIZE
        || sector_size > MAX_VOLUME_SECTOR_SIZE
        || sector_size % ENCRYPTION_DATA_UNIT_SIZE != 0
    {
        return Err(Error::ParameterIncorrect("sector size"));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum VolumeType {
    #[default]
    Unknown,
    Normal,
    Hidden,
}

/// Options for creating a fresh volume header.
pub struct VolumeHeaderCreationOptions {
    /// Unkeyed algorithm from the catalog; keyed here from `data_key`.
    pub ea: EncryptionAlgorithm,
    pub kdf: Pkcs5Kdf,
    /// Data-area key material, `2 * ea.key_size()` bytes (`cipher ‖ tweak`).
    pub data_key: SecureBuffer,
    pub salt: SecureBuffer,
    pub header_key: SecureBuffer,
    pub volume_data_start: u64,
    pub volume_data_size: u64,
    pub sector_size: u32,
    pub volume_type: VolumeType,
}

/// The volume header: salt, format metadata and the data-area keys,
/// together with the algorithm and KDF latched by a successful decrypt.
///
/// All key material lives in `SecureBuffer`s and is wiped on drop.
pub struct VolumeHeader {
    header_size: usize,
    encrypted_header_data_size: usize,

    header_version: u16,
    required_min_program_version: u16,
    volume_key_area_crc32: u32,
    volume_creation_time: u64,
    header_creation_time: u64,
    hidden_volume_data_size: u64,
    volume_data_size: u64,
    encrypted_area_start: u64,
    encrypted_area_length: u64,
    flags: u32,
    sector_size: u32,
    volume_type: VolumeType,

    salt: SecureBuffer,
    data_area_key: SecureBuffer,
    header_key: SecureBuffer,

    ea: Option<Arc<EncryptionAlgorithm>>,
    pkcs5: Option<Pkcs5Kdf>,
}

impl VolumeHeader {
    /// Constructs an empty header for a blob of `header_size` bytes
    /// (typically 512).
    pub fn new(header_size: usize) -> Result<Self> {
        if header_size < ENCRYPTED_HEADER_DATA_OFFSET + DATA_AREA_KEY_OFFSET + DATA_KEY_AREA_MAX_SIZE
        {
            return Err(Error::ParameterIncorrect("header size"));
        }
        Ok(VolumeHeader {
            header_size,
            encrypted_header_data_size: header_size - ENCRYPTED_HEADER_DATA_OFFSET,
            header_version: 0,
            required_min_program_version: 0,
            volume_key_area_crc32: 0,
            volume_creation_time: 0,
            header_creation_time: 0,
            hidden_volume_data_size: 0,
            volume_data_size: 0,
            encrypted_area_start: 0,
            encrypted_area_length: 0,
            flags: 0,
            sector_size: 0,
            volume_type: VolumeType::Unknown,
            salt: SecureBuffer::new(SALT_SIZE),
            data_area_key: SecureBuffer::new(DATA_KEY_AREA_MAX_SIZE),
            header_key: SecureBuffer::new(0),
            ea: None,
            pkcs5: None,
        })
    }

    pub fn get_size(&self) -> usize {
        self.header_size
    }

    pub fn set_size(&mut self, header_size: usize) -> Result<()> {
        if header_size < ENCRYPTED_HEADER_DATA_OFFSET + DATA_AREA_KEY_OFFSET + DATA_KEY_AREA_MAX_SIZE
        {
            return Err(Error::ParameterIncorrect("header size"));
        }
        self.header_size = header_size;
        self.encrypted_header_data_size = header_size - ENCRYPTED_HEADER_DATA_OFFSET;
        Ok(())
    }

    pub fn encrypted_header_data_size(&self) -> usize {
        self.encrypted_header_data_size
    }

    /// Creates a new volume header in `header_buffer` and leaves this
    /// object keyed for data-area I/O, as after a successful decrypt.
    pub fn create(
        &mut self,
        header_buffer: &mut [u8],
        options: VolumeHeaderCreationOptions,
    ) -> Result<()> {
        let mut ea = options.ea;
        if options.data_key.len() != ea.key_size() * 2 {
            return Err(Error::ParameterIncorrect("data key length"));
        }
        if options.salt.len() != SALT_SIZE {
            return Err(Error::ParameterIncorrect("salt length"));
        }
        validate_sector_size(options.sector_size)?;

        header_buffer.fill(0);

        self.header_version = CURRENT_HEADER_VERSION;
        self.required_min_program_version = CURRENT_REQUIRED_MIN_PROGRAM_VERSION;

        self.data_area_key.zero();
        self.data_area_key.copy_from(options.data_key.as_slice())?;

        self.volume_creation_time = 0;
        self.header_creation_time = 0;
        self.hidden_volume_data_size = if options.volume_type == VolumeType::Hidden {
            options.volume_data_size
        } else {
            0
        };
        self.volume_data_size = options.volume_data_size;
        self.encrypted_area_start = options.volume_data_start;
        self.encrypted_area_length = options.volume_data_size;
        self.sector_size = options.sector_size;
        self.volume_type = options.volume_type;

        // Key the algorithm and a fresh XTS mode from the data key halves.
        let key_size = ea.key_size();
        ea.set_key(options.data_key.range(0, key_size)?)?;
        let mut mode = EncryptionMode::new_xts();
        mode.set_key(options.data_key.range(key_size, key_size)?)?;
        ea.set_mode(mode)?;
        self.ea = Some(Arc::new(ea));

        self.encrypt_new(
            header_buffer,
            options.salt.as_slice(),
            options.header_key.as_slice(),
            Some(options.kdf),
        )
    }

    /// Trial-decrypts the raw header blob against every (KDF, mode,
    /// algorithm) combination from the given lists, in list order.
    ///
    /// Returns `Ok(true)` and latches the winning primitives, the derived
    /// header key and the parsed fields on success; `Ok(false)` when every
    /// combination has been exhausted. Malformed-but-authentic headers
    /// surface as errors.
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt(
        &mut self,
        encrypted_data: &[u8],
        password: &[u8],
        pim: u32,
        preferred_kdf: Option<&Pkcs5Kdf>,
        truecrypt_mode: bool,
        kdfs: &[Pkcs5Kdf],
        algorithms: &[EncryptionAlgorithm],
        modes: &[EncryptionMode],
    ) -> Result<bool> {
        if password.is_empty() {
            return Err(Error::PasswordEmpty);
        }
        if encrypted_data.len() != self.header_size {
            return Err(Error::ParameterIncorrect("encrypted header length"));
        }

        let salt = &encrypted_data[SALT_OFFSET..SALT_OFFSET + SALT_SIZE];
        self.salt.copy_from(salt)?;

        let mut header = SecureBuffer::new(self.encrypted_header_data_size);
        let mut header_key = SecureBuffer::new(largest_serialized_key_size(algorithms));

        for kdf in kdfs {
            if let Some(preferred) = preferred_kdf {
                if preferred.name() != kdf.name() {
                    continue;
                }
            }

            trace!("deriving header key with {}", kdf.name());
            kdf.derive_key(header_key.as_mut_slice(), password, pim, salt)?;

            for mode in modes {
                // A legacy mode takes its key from the front of the header
                // key once per mode; XTS keys are cut per algorithm below.
                let mut candidate_mode = mode.get_new();
                if !candidate_mode.is_xts() {
                    candidate_mode.set_key(header_key.range(0, candidate_mode.key_size())?)?;
                }

                for algorithm in algorithms {
                    if !algorithm.is_mode_supported(&candidate_mode) {
                        continue;
                    }

                    let mut ea = algorithm.get_new();
                    let key_size = ea.key_size();
                    if candidate_mode.is_xts() {
                        ea.set_key(header_key.range(0, key_size)?)?;
                        let mut xts = candidate_mode.get_new();
                        xts.set_key(header_key.range(key_size, key_size)?)?;
                        ea.set_mode(xts)?;
                    } else {
                        ea.set_key(
                            header_key.range(LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE, key_size)?,
                        )?;
                        ea.set_mode(candidate_mode.clone())?;
                    }

                    header.copy_from(&encrypted_data[ENCRYPTED_HEADER_DATA_OFFSET..])?;
                    ea.decrypt(header.as_mut_slice())?;

                    if self.deserialize(header.as_slice(), &mut ea, truecrypt_mode)? {
                        let mut latched_key = SecureBuffer::new(header_key.len());
                        latched_key.copy_from(header_key.as_slice())?;
                        self.header_key = latched_key;
                        self.pkcs5 = Some(*kdf);
                        debug!(
                            "volume header decrypted: kdf={} algorithm={} mode={}",
                            kdf.name(),
                            ea.name(),
                            ea.mode().map(|m| m.name()).unwrap_or("?"),
                        );
                        self.ea = Some(Arc::new(ea));
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    /// Parses a decrypted header candidate. Returns `Ok(false)` when the
    /// plaintext does not authenticate (wrong key): bad magic, version
    /// below minimum, or either CRC mismatch. On success the header fields
    /// are populated and `ea` is replaced by a fresh instance keyed from
    /// the data-area key, ready for payload sectors.
    pub fn deserialize(
        &mut self,
        header: &[u8],
        ea: &mut EncryptionAlgorithm,
        truecrypt_mode: bool,
    ) -> Result<bool> {
        if header.len() != self.encrypted_header_data_size {
            return Err(Error::ParameterIncorrect("decrypted header length"));
        }

        let magic: &[u8] = if truecrypt_mode { b"TRUE" } else { b"VERA" };
        if &header[0..4] != magic {
            return Ok(false);
        }

        let mut offset = 4;
        self.header_version = endian::read_next::<u16>(header, &mut offset)?;

        if self.header_version < min_allowed_header_version(truecrypt_mode) {
            return Ok(false);
        }
        if self.header_version > CURRENT_HEADER_VERSION {
            return Err(Error::HigherVersionRequired);
        }

        if self.header_version >= 4
            && crc32fast::hash(&header[..HEADER_CRC_OFFSET])
                != endian::read_at::<u32>(header, HEADER_CRC_OFFSET)?
        {
            return Ok(false);
        }

        self.required_min_program_version = endian::read_next::<u16>(header, &mut offset)?;

        if !truecrypt_mode && self.required_min_program_version > PROGRAM_VERSION_NUMBER {
            return Err(Error::HigherVersionRequired);
        }
        if truecrypt_mode {
            if self.required_min_program_version < TRUECRYPT_MIN_PROGRAM_VERSION
                || self.required_min_program_version > TRUECRYPT_MAX_PROGRAM_VERSION
            {
                return Err(Error::UnsupportedTrueCryptFormat);
            }
            self.required_min_program_version = CURRENT_REQUIRED_MIN_PROGRAM_VERSION;
        }

        self.volume_key_area_crc32 = endian::read_next::<u32>(header, &mut offset)?;
        self.volume_creation_time = endian::read_next::<u64>(header, &mut offset)?;
        self.header_creation_time = endian::read_next::<u64>(header, &mut offset)?;
        self.hidden_volume_data_size = endian::read_next::<u64>(header, &mut offset)?;
        self.volume_type = if self.hidden_volume_data_size != 0 {
            VolumeType::Hidden
        } else {
            VolumeType::Normal
        };
        self.volume_data_size = endian::read_next::<u64>(header, &mut offset)?;
        self.encrypted_area_start = endian::read_next::<u64>(header, &mut offset)?;
        self.encrypted_area_length = endian::read_next::<u64>(header, &mut offset)?;
        self.flags = endian::read_next::<u32>(header, &mut offset)?;

        self.sector_size = endian::read_next::<u32>(header, &mut offset)?;
        if self.header_version < 5 {
            self.sector_size = SECTOR_SIZE_LEGACY;
        }
        validate_sector_size(self.sector_size)?;

        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        {
            if self.sector_size != SECTOR_SIZE_LEGACY {
                return Err(Error::UnsupportedSectorSize(self.sector_size));
            }
        }

        let key_area = &header[DATA_AREA_KEY_OFFSET..DATA_AREA_KEY_OFFSET + DATA_KEY_AREA_MAX_SIZE];
        if self.volume_key_area_crc32 != crc32fast::hash(key_area) {
            return Ok(false);
        }

        self.data_area_key.copy_from(key_area)?;

        // Re-key a fresh algorithm and mode from the data-area key; the
        // caller's trial instances carry the header key.
        let bound_mode = ea
            .mode()
            .ok_or(Error::ParameterIncorrect("encryption mode not set"))?;
        let mut fresh_ea = ea.get_new();
        let mut fresh_mode = bound_mode.get_new();
        let key_size = fresh_ea.key_size();

        if fresh_mode.is_xts() {
            fresh_ea.set_key(&key_area[..key_size])?;
            fresh_mode.set_key(&key_area[key_size..2 * key_size])?;
        } else {
            fresh_mode.set_key(&key_area[..fresh_mode.key_size()])?;
            fresh_ea.set_key(
                &key_area[LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE
                    ..LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE + key_size],
            )?;
        }
        fresh_ea.set_mode(fresh_mode)?;
        *ea = fresh_ea;

        Ok(true)
    }

    /// Serializes the plaintext header layout into `header` (the region
    /// after the salt, caller-zeroed to `encrypted_header_data_size`).
    pub fn serialize(&self, header: &mut [u8]) -> Result<()> {
        if header.len() != self.encrypted_header_data_size {
            return Err(Error::ParameterIncorrect("plaintext header length"));
        }

        header.fill(0);
        header[0..4].copy_from_slice(b"VERA");

        header[DATA_AREA_KEY_OFFSET..DATA_AREA_KEY_OFFSET + DATA_KEY_AREA_MAX_SIZE]
            .copy_from_slice(self.data_area_key.as_slice());

        let mut offset = 4;
        endian::write_next::<u16>(CURRENT_HEADER_VERSION, header, &mut offset)?;
        endian::write_next::<u16>(self.required_min_program_version, header, &mut offset)?;

        let key_area_crc = crc32fast::hash(
            &header[DATA_AREA_KEY_OFFSET..DATA_AREA_KEY_OFFSET + DATA_KEY_AREA_MAX_SIZE],
        );
        endian::write_next::<u32>(key_area_crc, header, &mut offset)?;

        // Creation times are reserved and written as zero.
        endian::write_next::<u64>(0, header, &mut offset)?;
        endian::write_next::<u64>(0, header, &mut offset)?;

        endian::write_next::<u64>(self.hidden_volume_data_size, header, &mut offset)?;
        endian::write_next::<u64>(self.volume_data_size, header, &mut offset)?;
        endian::write_next::<u64>(self.encrypted_area_start, header, &mut offset)?;
        endian::write_next::<u64>(self.encrypted_area_length, header, &mut offset)?;
        endian::write_next::<u32>(self.flags, header, &mut offset)?;

        validate_sector_size(self.sector_size)?;
        endian::write_next::<u32>(self.sector_size, header, &mut offset)?;

        let header_crc = crc32fast::hash(&header[..HEADER_CRC_OFFSET]);
        endian::write_at::<u32>(header_crc, header, HEADER_CRC_OFFSET)?;

        Ok(())
    }

    /// Writes and encrypts a fresh header blob with the given salt and
    /// header key, latching both (and the KDF, when given) for later
    /// re-encryption.
    pub fn encrypt_new(
        &mut self,
        header_buffer: &mut [u8],
        salt: &[u8],
        header_key: &[u8],
        kdf: Option<Pkcs5Kdf>,
    ) -> Result<()> {
        if header_buffer.len() != self.header_size {
            return Err(Error::ParameterIncorrect("header buffer length"));
        }
        if salt.len() != SALT_SIZE {
            return Err(Error::ParameterIncorrect("salt length"));
        }

        let latched = self
            .ea
            .as_ref()
            .ok_or(Error::ParameterIncorrect("no encryption algorithm bound"))?;
        let bound_mode = latched
            .mode()
            .ok_or(Error::ParameterIncorrect("no encryption mode bound"))?;

        let mut ea = latched.get_new();
        let mut mode = bound_mode.get_new();
        let key_size = ea.key_size();

        if mode.is_xts() {
            if header_key.len() < 2 * key_size {
                return Err(Error::ParameterIncorrect("header key length"));
            }
            ea.set_key(&header_key[..key_size])?;
            mode.set_key(&header_key[key_size..2 * key_size])?;
        } else {
            if header_key.len() < LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE + key_size {
                return Err(Error::ParameterIncorrect("header key length"));
            }
            mode.set_key(&header_key[..mode.key_size()])?;
            ea.set_key(
                &header_key[LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE
                    ..LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE + key_size],
            )?;
        }
        ea.set_mode(mode)?;

        header_buffer[..SALT_SIZE].copy_from_slice(salt);
        let header_data = &mut header_buffer[ENCRYPTED_HEADER_DATA_OFFSET..];
        self.serialize(header_data)?;
        ea.encrypt(header_data)?;

        self.salt.copy_from(salt)?;
        let mut latched_key = SecureBuffer::new(header_key.len());
        latched_key.copy_from(header_key)?;
        self.header_key = latched_key;
        if let Some(kdf) = kdf {
            self.pkcs5 = Some(kdf);
        }

        Ok(())
    }

    /// Re-encrypts the header with the latched salt and header key, for
    /// re-serialization after metadata changes.
    pub fn encrypt(&mut self, header_buffer: &mut [u8]) -> Result<()> {
        if self.header_key.is_empty() {
            return Err(Error::ParameterIncorrect("header key not latched"));
        }
        let mut salt = Zeroizing::new([0u8; SALT_SIZE]);
        salt.copy_from_slice(self.salt.as_slice());
        let header_key = Zeroizing::new(self.header_key.as_slice().to_vec());
        self.encrypt_new(header_buffer, &salt[..], &header_key[..], None)
    }

    pub fn header_version(&self) -> u16 {
        self.header_version
    }

    pub fn required_min_program_version(&self) -> u16 {
        self.required_min_program_version
    }

    pub fn volume_key_area_crc32(&self) -> u32 {
        self.volume_key_area_crc32
    }

    pub fn volume_creation_time(&self) -> u64 {
        self.volume_creation_time
    }

    pub fn header_creation_time(&self) -> u64 {
        self.header_creation_time
    }

    pub fn hidden_volume_data_size(&self) -> u64 {
        self.hidden_volume_data_size
    }

    pub fn volume_data_size(&self) -> u64 {
        self.volume_data_size
    }

    pub fn encrypted_area_start(&self) -> u64 {
        self.encrypted_area_start
    }

    pub fn encrypted_area_length(&self) -> u64 {
        self.encrypted_area_length
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn volume_type(&self) -> VolumeType {
        self.volume_type
    }

    pub fn salt(&self) -> &[u8] {
        self.salt.as_slice()
    }

    pub fn data_area_key(&self) -> &[u8] {
        self.data_area_key.as_slice()
    }

    /// The transient header key from the last decrypt or encrypt-new.
    /// Never persisted; empty until one of those succeeds.
    pub fn header_key(&self) -> &[u8] {
        self.header_key.as_slice()
    }

    /// The algorithm latched by the last successful decrypt or create,
    /// keyed for data-area sectors. Shared with callers that keep using it
    /// after the header is released.
    pub fn ea(&self) -> Option<Arc<EncryptionAlgorithm>> {
        self.ea.clone()
    }

    pub fn pkcs5(&self) -> Option<Pkcs5Kdf> {
        self.pkcs5
    }
}

/// Header-key buffer size that fits any candidate triple: XTS needs twice
/// the algorithm key, legacy modes need their own area in front of it.
pub fn largest_serialized_key_size(algorithms: &[EncryptionAlgorithm]) -> usize {
    let largest = crypto::largest_key_size(algorithms);
    cmp::max(
        largest * 2,
        LEGACY_ENCRYPTION_MODE_KEY_AREA_SIZE + largest,
    )
}
