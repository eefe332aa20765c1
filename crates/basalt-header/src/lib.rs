//! The volume header: layout geometry, credential folding, and the
//! decrypt/encrypt protocol that binds a password and keyfiles to a
//! cascade, a mode, and a master key.

pub mod codec;
pub mod credentials;
pub mod fields;
pub mod layout;
pub mod master_key;

pub use codec::{build_mode, decrypt_header, encrypt_header, key_len_for, random_header_shaped_block, DecodedHeader, HeaderCodecError, SALT_LEN};
pub use credentials::{mix_credentials, CredentialError, Keyfile, VolumePassword, CREDENTIAL_BUFFER_LEN};
pub use fields::{HeaderFieldError, HeaderFields, HeaderFlags};
pub use layout::{FormatVersion, VolumeLayout, HEADER_GROUP_SIZE, HEADER_SIZE};
pub use master_key::MasterKey;
