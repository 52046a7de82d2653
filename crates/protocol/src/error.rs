//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Fehler beim Kodieren/Dekodieren von Frames und Umschlaegen
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Frame-Format ungueltig: {0}")]
    Format(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    SchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Chiffre-Fehler: {0}")]
    Chiffre(String),
}

impl ProtokollFehler {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

/// Result-Typ fuer das Protokoll-Crate
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
