//! Serializes `CoreError` across the IPC boundary by *kind*, not by
//! message, so a `VolumeAlreadyMounted` raised inside the elevated helper
//! reconstructs as the same `CoreError` variant on the client side (§4.10:
//! "preserve exception identity"). Variants that wrap a lower crate's own
//! error collapse to their closest taxonomy kind from §7 — the client
//! never needs to match on `basalt_mode::ModeError` across a process
//! boundary, only on the public taxonomy.

use std::io;
use std::path::PathBuf;

use basalt_core::CoreError;

#[derive(Debug, Clone)]
pub enum ExceptionWire {
    UserAbort,
    PasswordIncorrect { path: String },
    PasswordKeyfilesIncorrect { path: String },
    ProtectionPasswordIncorrect,
    VolumeAlreadyMounted { path: String },
    VolumeProtected,
    VolumeReadOnly { path: String },
    MountedVolumeInUse { slot: u32 },
    HeaderCorrupt { path: String },
    ParameterIncorrect { message: String },
    SystemException { subject: String, os_code: i32, message: String },
    NotImplemented { operation: String },
    TestFailed { message: String },
    NoFreeSlot,
}

impl From<&CoreError> for ExceptionWire {
    fn from(e: &CoreError) -> ExceptionWire {
        match e {
            CoreError::UserAbort => ExceptionWire::UserAbort,
            CoreError::PasswordIncorrect { path } => ExceptionWire::PasswordIncorrect { path: path.display().to_string() },
            CoreError::PasswordKeyfilesIncorrect { path } => ExceptionWire::PasswordKeyfilesIncorrect { path: path.display().to_string() },
            CoreError::ProtectionPasswordIncorrect => ExceptionWire::ProtectionPasswordIncorrect,
            CoreError::VolumeAlreadyMounted { path } => ExceptionWire::VolumeAlreadyMounted { path: path.display().to_string() },
            CoreError::VolumeProtected => ExceptionWire::VolumeProtected,
            CoreError::VolumeReadOnly { path } => ExceptionWire::VolumeReadOnly { path: path.display().to_string() },
            CoreError::MountedVolumeInUse { slot } => ExceptionWire::MountedVolumeInUse { slot: *slot },
            CoreError::HeaderCorrupt { path } => ExceptionWire::HeaderCorrupt { path: path.display().to_string() },
            CoreError::ParameterIncorrect(message) => ExceptionWire::ParameterIncorrect { message: message.clone() },
            CoreError::SystemException { subject, source } => {
                ExceptionWire::SystemException { subject: subject.clone(), os_code: source.raw_os_error().unwrap_or(0), message: source.to_string() }
            }
            CoreError::NotImplemented(operation) => ExceptionWire::NotImplemented { operation: operation.to_string() },
            CoreError::TestFailed(message) => ExceptionWire::TestFailed { message: message.clone() },
            CoreError::NoFreeSlot => ExceptionWire::NoFreeSlot,
            // Lower-crate errors have no meaningful on-disk path/slot of
            // their own by the time they would cross this boundary (every
            // call the helper services already carries that context) —
            // collapse to the taxonomy kind a caller would actually act on.
            CoreError::Mode(_) | CoreError::Credential(_) => ExceptionWire::ParameterIncorrect { message: e.to_string() },
            CoreError::Rng(_) | CoreError::Pool(_) => ExceptionWire::SystemException { subject: "core subsystem".to_string(), os_code: 0, message: e.to_string() },
        }
    }
}

impl From<ExceptionWire> for CoreError {
    fn from(w: ExceptionWire) -> CoreError {
        match w {
            ExceptionWire::UserAbort => CoreError::UserAbort,
            ExceptionWire::PasswordIncorrect { path } => CoreError::PasswordIncorrect { path: PathBuf::from(path) },
            ExceptionWire::PasswordKeyfilesIncorrect { path } => CoreError::PasswordKeyfilesIncorrect { path: PathBuf::from(path) },
            ExceptionWire::ProtectionPasswordIncorrect => CoreError::ProtectionPasswordIncorrect,
            ExceptionWire::VolumeAlreadyMounted { path } => CoreError::VolumeAlreadyMounted { path: PathBuf::from(path) },
            ExceptionWire::VolumeProtected => CoreError::VolumeProtected,
            ExceptionWire::VolumeReadOnly { path } => CoreError::VolumeReadOnly { path: PathBuf::from(path) },
            ExceptionWire::MountedVolumeInUse { slot } => CoreError::MountedVolumeInUse { slot },
            ExceptionWire::HeaderCorrupt { path } => CoreError::HeaderCorrupt { path: PathBuf::from(path) },
            ExceptionWire::ParameterIncorrect { message } => CoreError::ParameterIncorrect(message),
            ExceptionWire::SystemException { subject, os_code, message } => {
                let source = if os_code != 0 { io::Error::from_raw_os_error(os_code) } else { io::Error::other(message) };
                CoreError::SystemException { subject, source }
            }
            // `CoreError::NotImplemented` carries a `&'static str`; the
            // helper only ever raises it for a fixed, known set of
            // operations, so the client looks the static string back up by
            // name instead of leaking a fresh allocation per reconstruction.
            ExceptionWire::NotImplemented { operation } => CoreError::NotImplemented(static_operation_name(&operation)),
            ExceptionWire::TestFailed { message } => CoreError::TestFailed(message),
            ExceptionWire::NoFreeSlot => CoreError::NoFreeSlot,
        }
    }
}

/// The fixed set of operation names the elevated helper can report as
/// unavailable on the current platform. Anything outside this set
/// degrades to a generic label rather than growing the process's static
/// string table at runtime.
fn static_operation_name(name: &str) -> &'static str {
    match name {
        "get_host_devices" => "get_host_devices",
        "create_volume on a raw device" => "create_volume on a raw device",
        "restore_headers_from_internal_backup" => "restore_headers_from_internal_backup",
        _ => "elevated operation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_volume_already_mounted() {
        let original = CoreError::VolumeAlreadyMounted { path: PathBuf::from("/tmp/v.basalt") };
        let wire = ExceptionWire::from(&original);
        let restored: CoreError = wire.into();
        assert!(matches!(restored, CoreError::VolumeAlreadyMounted { path } if path == PathBuf::from("/tmp/v.basalt")));
    }

    #[test]
    fn round_trips_system_exception_with_os_code() {
        let source = io::Error::from_raw_os_error(5);
        let original = CoreError::SystemException { subject: "/dev/disk2".to_string(), source };
        let wire = ExceptionWire::from(&original);
        let restored: CoreError = wire.into();
        match restored {
            CoreError::SystemException { subject, source } => {
                assert_eq!(subject, "/dev/disk2");
                assert_eq!(source.raw_os_error(), Some(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
