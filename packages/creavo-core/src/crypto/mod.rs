//! # Cryptography Module
//!
//! All cryptographic primitives used by Creavo Core.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  codec        base64 text  ◄──►  raw bytes (validated lengths)         │
//! │                                                                         │
//! │  keys         X25519 KeyPair / PublicKey / SecretKey                   │
//! │                                                                         │
//! │  encryption   message box: X25519 → HKDF-SHA256 → XChaCha20-Poly1305   │
//! │               optional admin copy under the same nonce                 │
//! │                                                                         │
//! │  wrapping     secret key sealed under SHA-512(password ‖ salt)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | X25519 | Key agreement between static keys |
//! | HKDF-SHA256 | Box key from the shared secret |
//! | XChaCha20-Poly1305 | AEAD with 24-byte random nonces |
//! | SHA-512 | Password key |
//!
//! Secret keys and derived AEAD keys are zeroized on drop. Randomness comes
//! from `rand::rngs::OsRng`.

pub mod codec;
mod encryption;
mod kdf;
mod keys;
mod wrapping;

pub use encryption::{
    decrypt, decrypt_encoded, encrypt, encrypt_encoded, encrypt_with_admin_copy, EncodedMessage,
    EncryptionKey, MessageLimits, Nonce, SealedMessage, SealedWithAdminCopy,
    MAX_CIPHERTEXT_TEXT_LEN, MAX_PLAINTEXT_CHARS, MAX_SHORT_FIELD_TEXT_LEN,
};
pub use kdf::{derive_box_key, derive_password_key};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use wrapping::{unwrap, wrap, EncodedWrappedKey, Salt, WrappedSecretKey, WRAPPED_KEY_SIZE};

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an X25519 secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a symmetric AEAD key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 24;

/// Size of a password salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;
