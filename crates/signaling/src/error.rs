//! Fehlertypen fuer den Signaling-Service

use hinterzimmer_crypto::CryptoError;
use hinterzimmer_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Identitaet konnte nicht geladen oder erzeugt werden
    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    /// `server-key`-Frame nicht serialisierbar
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Quelladresse ist gesperrt
    #[error("Quelladresse ist gesperrt: {0}")]
    Gebannt(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
