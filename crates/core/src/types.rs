//! Gemeinsame Identifikationstypen fuer Hinterzimmer
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Verbindungs-IDs und Channel-Namen zur Compilezeit auszuschliessen.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::HinterzimmerError;

/// Anzahl Zufallsbytes einer Verbindungs-ID
pub const CONNECTION_ID_BYTES: usize = 8;

/// Opake Verbindungs-ID: 16 Hex-Zeichen (klein) aus 8 Zufallsbytes
///
/// Keine persistente Identitaet – gilt nur fuer die Lebensdauer einer
/// einzelnen Verbindung.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Erzeugt eine neue zufaellige ID
    ///
    /// Kollisionen mit lebenden IDs prueft erst die Registry.
    pub fn zufaellig() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parst eine vom Client gelieferte ID
    ///
    /// Gibt `None` zurueck wenn der String nicht genau 16 kleine Hex-Zeichen hat.
    pub fn parsen(s: &str) -> Option<Self> {
        let gueltig = s.len() == CONNECTION_ID_BYTES * 2
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        gueltig.then(|| Self(s.to_string()))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = HinterzimmerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parsen(s).ok_or_else(|| HinterzimmerError::UngueltigeId(s.to_string()))
    }
}

/// Channel-Name, wie ihn ein Client beim Beitritt angibt
///
/// Der Name ist opak; leere Namen werden abgelehnt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Erstellt einen Channel-Namen, `None` bei leerem String
    pub fn neu(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        (!name.is_empty()).then_some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
