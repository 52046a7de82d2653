//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    #[error("Key-Exchange fehlgeschlagen: {0}")]
    KeyExchange(String),

    #[error("Signierung fehlgeschlagen: {0}")]
    Signierung(String),

    #[error("Signatur-Verifikation fehlgeschlagen: {0}")]
    SignaturVerifikation(String),

    #[error("Schluessel-Kodierung fehlgeschlagen: {0}")]
    Kodierung(String),

    #[error("Hex-Dekodierung fehlgeschlagen: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Protokoll(#[from] hinterzimmer_protocol::ProtokollFehler),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
