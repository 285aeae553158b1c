//! Payload encryption for sensitive endpoints.

mod gateway;

pub use gateway::{CryptoError, EncryptedEnvelope, EncryptionGateway};
