//! Fehlertypen fuer Hinterzimmer
//!
//! Untermodule der anderen Crates definieren eigene Fehler-Enums.

use thiserror::Error;

/// Globaler Result-Alias fuer Hinterzimmer
pub type Result<T> = std::result::Result<T, HinterzimmerError>;

/// Fehler der gemeinsamen Typen
#[derive(Debug, Error)]
pub enum HinterzimmerError {
    #[error("Ungueltige Verbindungs-ID: {0}")]
    UngueltigeId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = HinterzimmerError::UngueltigeId("xyz".into());
        assert_eq!(e.to_string(), "Ungueltige Verbindungs-ID: xyz");
    }
}
