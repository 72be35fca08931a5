//! Volume-header codec and key-derivation search for TrueCrypt 7.x and
//! VeraCrypt family containers.
//!
//! The 512-byte header blob carries a cleartext salt followed by an
//! encrypted region. Nothing in the blob identifies the key-derivation
//! function, encryption mode or algorithm that protect it; the only oracle
//! is whether a candidate decryption yields a self-consistent plaintext
//! (magic plus two CRC32 checks). [`VolumeHeader::decrypt`] drives that
//! trial-decryption search and latches the winning primitives together
//! with the data-area keys.
//!
//! ```no_run
//! use noxvolume::{available_algorithms, available_kdfs, available_modes, VolumeHeader};
//!
//! # fn main() -> noxvolume::Result<()> {
//! let blob = std::fs::read("volume.hc").expect("volume file");
//! let mut header = VolumeHeader::new(512)?;
//! let found = header.decrypt(
//!     &blob[..512],
//!     b"password",
//!     0,
//!     None,
//!     false,
//!     &available_kdfs(false),
//!     &available_algorithms(),
//!     &available_modes(),
//! )?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod crypto;
pub mod endian;
pub mod error;
pub mod header;
pub mod kdf;

pub use buffer::SecureBuffer;
pub use crypto::{
    available_algorithms, available_modes, EaKind, EncryptionAlgorithm, EncryptionMode,
};
pub use error::{Error, Result};
pub use header::{
    largest_serialized_key_size, VolumeHeader, VolumeHeaderCreationOptions, VolumeType,
};
pub use kdf::{available_kdfs, HashFunction, Pkcs5Kdf};
