//! The error taxonomy every public operation raises. Lower crates keep
//! their own error types; only here, where enough context exists to tell
//! "wrong password" apart from "media damage" apart from "caller mistake",
//! do they compose into one enum.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("operation aborted by the caller")]
    UserAbort,

    #[error("the password did not unlock {path}")]
    PasswordIncorrect { path: PathBuf },

    #[error("the password and keyfiles together did not unlock {path}")]
    PasswordKeyfilesIncorrect { path: PathBuf },

    #[error("the hidden-volume protection password did not unlock the inner volume")]
    ProtectionPasswordIncorrect,

    #[error("{path} is already mounted")]
    VolumeAlreadyMounted { path: PathBuf },

    #[error("write refused: overlaps the protected hidden volume range")]
    VolumeProtected,

    #[error("{path} is mounted read-only")]
    VolumeReadOnly { path: PathBuf },

    #[error("mounted volume at slot {slot} is still in use")]
    MountedVolumeInUse { slot: u32 },

    #[error("header at {path} failed its CRC check after a prior successful decrypt — media damage, not a wrong password")]
    HeaderCorrupt { path: PathBuf },

    #[error("invalid parameter: {0}")]
    ParameterIncorrect(String),

    #[error("system error on {subject}: {source}")]
    SystemException { subject: String, #[source] source: std::io::Error },

    #[error("{0} is not implemented on this platform")]
    NotImplemented(&'static str),

    #[error("self-test failed: {0}")]
    TestFailed(String),

    #[error("no free mount slot below the configured limit")]
    NoFreeSlot,

    #[error(transparent)]
    Mode(#[from] basalt_mode::ModeError),

    #[error(transparent)]
    Rng(#[from] basalt_rng::RngError),

    #[error(transparent)]
    Pool(#[from] basalt_pool::PoolError),

    #[error(transparent)]
    Credential(#[from] basalt_header::CredentialError),
}

impl From<basalt_io::BackingError> for CoreError {
    fn from(e: basalt_io::BackingError) -> CoreError {
        match e {
            basalt_io::BackingError::Io { path, source } => CoreError::SystemException { subject: path.display().to_string(), source },
            basalt_io::BackingError::ShortTransfer { path, offset, .. } => CoreError::SystemException {
                subject: format!("{} at offset {offset}", path.display()),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short transfer"),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
