use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the header codec and trial-decryption engine.
///
/// Wrong-password conditions are not errors: magic, version-minimum and CRC
/// mismatches make the trial engine keep searching and `decrypt` ultimately
/// return `Ok(false)`.
#[derive(Error, Debug)]
pub enum Error {
    /// A size or invariant precondition was violated by the caller.
    #[error("parameter incorrect: {0}")]
    ParameterIncorrect(&'static str),

    /// The password has length zero.
    #[error("password must not be empty")]
    PasswordEmpty,

    /// A well-formed header declares a version this build cannot interpret.
    #[error("a newer program version is required to open this volume")]
    HigherVersionRequired,

    /// TrueCrypt-compat mode and the minimum program version lies outside
    /// the accepted TrueCrypt range.
    #[error("not a supported TrueCrypt volume format")]
    UnsupportedTrueCryptFormat,

    /// Platform-gated rejection of non-512 sector sizes.
    #[error("sector size {0} is not supported on this platform")]
    UnsupportedSectorSize(u32),

    /// Internal bounds violation in buffer slicing. Indicates a bug, not
    /// bad input data.
    #[error("buffer range out of bounds: offset {offset}, len {len}, buffer size {size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },
}
