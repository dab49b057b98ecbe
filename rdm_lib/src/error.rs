//! Shared error types for read and write operations.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("not a compiled material definition: {0}")]
    Format(String),

    #[error("unsupported material version {0}")]
    UnsupportedVersion(u64),

    #[error("invalid {kind} name {name:?}")]
    InvalidEnum { kind: &'static str, name: String },

    #[error(transparent)]
    Platform(#[from] PlatformMapError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("string data is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("error reading material data")]
    Binrw(#[from] binrw::Error),

    #[error("error reading material file")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("material cannot be serialized: {0}")]
    Format(String),

    #[error("unsupported material version {0}")]
    UnsupportedVersion(u64),

    #[error("count exceeds the range of its wire field")]
    CountOverflow(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    Platform(#[from] PlatformMapError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("error writing material data")]
    Binrw(#[from] binrw::Error),

    #[error("error writing material file")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("key-pair encryption is not supported")]
    KeyPairUnsupported,

    #[error("invalid encryption tag {0:?}")]
    InvalidTag([u8; 4]),

    #[error("encryption key must be 16, 24, or 32 bytes but has {0}")]
    InvalidKeyLength(usize),

    #[error("encryption nonce must be at least 12 bytes but has {0}")]
    InvalidNonceLength(usize),

    #[error("encrypted material is missing its {0}")]
    MissingSecret(&'static str),
}

#[derive(Debug, Error)]
#[error("platform {platform} has no wire index in version {version}")]
pub struct PlatformMapError {
    pub platform: String,
    pub version: u64,
}
