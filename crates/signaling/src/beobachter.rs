//! Haken fuer Metriken
//!
//! Der Relay meldet Zustandsaenderungen an einen `RelayBeobachter`. Die
//! Prometheus-Anbindung lebt im Server-Crate; ohne Beobachter passiert nichts.

/// Ausgang eines Handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErgebnis {
    Erfolg,
    Fehler,
}

impl HandshakeErgebnis {
    pub fn label(self) -> &'static str {
        match self {
            Self::Erfolg => "erfolg",
            Self::Fehler => "fehler",
        }
    }
}

/// Empfaenger fuer Relay-Ereignisse
///
/// Alle Methoden werden synchron und teilweise unter der Tabellen-Sperre
/// aufgerufen; Implementierungen duerfen nicht blockieren.
pub trait RelayBeobachter: Send + Sync {
    fn verbindungen_gesetzt(&self, _anzahl: usize) {}
    fn channels_gesetzt(&self, _anzahl: usize) {}
    fn handshake(&self, _ergebnis: HandshakeErgebnis) {}
    fn weitergeleitet(&self, _anzahl: usize) {}
    fn verworfen(&self, _grund: &'static str) {}
    fn verdraengt(&self, _anzahl: usize) {}
}

/// Beobachter ohne Wirkung
#[derive(Debug, Default, Clone, Copy)]
pub struct KeinBeobachter;

impl RelayBeobachter for KeinBeobachter {}
