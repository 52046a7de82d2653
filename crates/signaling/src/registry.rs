//! Verbindungs-Registry
//!
//! Haelt alle lebenden Verbindungen und die Channel-Mitgliedschaften in
//! einer gemeinsamen Struktur. `SignalingState` schuetzt sie mit genau einer
//! Sperre, damit Beitritt, Verlassen und Weiterleitung sich nie ueberholen.
//!
//! ## Zustandsmaschine
//! ```text
//! Verbunden --Handshake--> Gesichert --j--> ImChannel
//!     |                        |                |
//!     +------------------------+----------------+--> entfernt
//! ```

use std::collections::HashMap;
use std::time::Instant;

use hinterzimmer_core::{ChannelName, ConnectionId};
use hinterzimmer_protocol::TransportSchluessel;

use crate::broadcast::ClientSender;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Server-Key gesendet, noch kein Schluessel
    Verbunden,
    /// Handshake abgeschlossen
    Gesichert { schluessel: TransportSchluessel },
    /// Mitglied eines Channels (endgueltig bis zum Trennen)
    ImChannel {
        schluessel: TransportSchluessel,
        channel: ChannelName,
    },
}

impl VerbindungsZustand {
    pub fn schluessel(&self) -> Option<&TransportSchluessel> {
        match self {
            Self::Verbunden => None,
            Self::Gesichert { schluessel } | Self::ImChannel { schluessel, .. } => Some(schluessel),
        }
    }

    pub fn channel(&self) -> Option<&ChannelName> {
        match self {
            Self::ImChannel { channel, .. } => Some(channel),
            _ => None,
        }
    }

    pub fn ist_gesichert(&self) -> bool {
        self.schluessel().is_some()
    }
}

/// Eine lebende Verbindung
#[derive(Debug)]
pub struct VerbindungsEintrag {
    pub id: ConnectionId,
    /// Quelladresse, nur fuer Sperren genutzt
    pub quelle: String,
    pub zuletzt_gesehen: Instant,
    pub zustand: VerbindungsZustand,
    pub sender: ClientSender,
}

impl VerbindungsEintrag {
    pub fn neu(id: ConnectionId, quelle: String, sender: ClientSender) -> Self {
        Self {
            id,
            quelle,
            zuletzt_gesehen: Instant::now(),
            zustand: VerbindungsZustand::Verbunden,
            sender,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayTabellen
// ---------------------------------------------------------------------------

/// Verbindungen und Channels
#[derive(Debug, Default)]
pub struct RelayTabellen {
    pub(crate) verbindungen: HashMap<ConnectionId, VerbindungsEintrag>,
    pub(crate) channels: HashMap<ChannelName, Vec<ConnectionId>>,
}

impl RelayTabellen {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt eine Verbindung ein
    ///
    /// Bei einer bereits vergebenen ID bleibt die Tabelle unveraendert und
    /// der Eintrag kommt zurueck.
    pub fn einfuegen(&mut self, eintrag: VerbindungsEintrag) -> Result<(), VerbindungsEintrag> {
        if self.verbindungen.contains_key(&eintrag.id) {
            return Err(eintrag);
        }
        self.verbindungen.insert(eintrag.id.clone(), eintrag);
        Ok(())
    }

    /// Zieht IDs, bis eine nicht vergebene dabei ist
    pub fn freie_id(&self, mut ziehen: impl FnMut() -> ConnectionId) -> ConnectionId {
        loop {
            let id = ziehen();
            if !self.verbindungen.contains_key(&id) {
                return id;
            }
            tracing::debug!(verbindung = %id, "Verbindungs-ID kollidiert, neu gezogen");
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&VerbindungsEintrag> {
        self.verbindungen.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut VerbindungsEintrag> {
        self.verbindungen.get_mut(id)
    }

    /// Sucht eine Verbindung ueber eine vom Client gelieferte ID
    pub fn suchen(&self, id: &str) -> Option<&VerbindungsEintrag> {
        ConnectionId::parsen(id).and_then(|id| self.verbindungen.get(&id))
    }

    pub fn anzahl(&self) -> usize {
        self.verbindungen.len()
    }

    /// Liefert den Eintrag nur, wenn `id` ein aktives Mitglied von `channel` ist
    ///
    /// Aktiv heisst: Verbindung lebt, hat einen Schluessel und ist genau in
    /// diesem Channel.
    pub fn aktives_mitglied(&self, id: &str, channel: &ChannelName) -> Option<&VerbindungsEintrag> {
        self.suchen(id)
            .filter(|eintrag| eintrag.zustand.ist_gesichert())
            .filter(|eintrag| eintrag.zustand.channel() == Some(channel))
    }

    /// IDs aller Verbindungen, die seit `grenze` nichts gesendet haben
    pub fn veraltete(&self, grenze: Instant) -> Vec<ConnectionId> {
        self.verbindungen
            .values()
            .filter(|eintrag| eintrag.zuletzt_gesehen < grenze)
            .map(|eintrag| eintrag.id.clone())
            .collect()
    }

    /// IDs aller Verbindungen mit dieser Quelladresse
    pub fn nach_quelle(&self, quelle: &str) -> Vec<ConnectionId> {
        self.verbindungen
            .values()
            .filter(|eintrag| eintrag.quelle == quelle)
            .map(|eintrag| eintrag.id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
