//! Ausgehende Frames
//!
//! Jede Verbindung hat eine begrenzte Send-Queue, die ihr Verbindungs-Task
//! abarbeitet. Der Router reiht nur ein und blockiert nie: ist die Queue
//! voll oder geschlossen, wird der Frame verworfen.
//!
//! ## Mitgliederliste
//! Nach jedem Beitritt und jedem Verlassen bekommt jedes aktive Mitglied des
//! Channels die Liste aller uebrigen Mitglieder, verschluesselt mit seinem
//! eigenen Schluessel.

use std::sync::Arc;

use hinterzimmer_core::{ChannelName, ConnectionId};
use hinterzimmer_protocol::{verschluesseln, ServerNachricht};
use tokio::sync::{mpsc, Notify};

use crate::registry::{RelayTabellen, VerbindungsEintrag};

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    schliessen: Arc<Notify>,
}

/// Empfangsseite, gehoert dem Verbindungs-Task
#[derive(Debug)]
pub struct Postfach {
    pub empfaenger: mpsc::Receiver<String>,
    pub schliessen: Arc<Notify>,
}

impl ClientSender {
    /// Erstellt Sender und Postfach mit einer Queue der Groesse `groesse`
    pub fn neu(id: ConnectionId, groesse: usize) -> (Self, Postfach) {
        let (tx, empfaenger) = mpsc::channel(groesse.max(1));
        let schliessen = Arc::new(Notify::new());
        (
            Self {
                id,
                tx,
                schliessen: Arc::clone(&schliessen),
            },
            Postfach {
                empfaenger,
                schliessen,
            },
        )
    }

    /// Reiht einen Frame nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.id, "Send-Queue voll – Frame verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Fordert den Verbindungs-Task auf, den Socket zu schliessen
    ///
    /// Das Signal bleibt gespeichert, falls der Task gerade nicht wartet.
    pub fn schliessen(&self) {
        self.schliessen.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Verschluesseltes Senden
// ---------------------------------------------------------------------------

/// Verschluesselt eine Nachricht mit dem Schluessel des Empfaengers und reiht sie ein
///
/// `false` wenn der Empfaenger keinen Schluessel hat oder das Einreihen scheitert.
pub fn verschluesselt_senden(empfaenger: &VerbindungsEintrag, nachricht: &ServerNachricht) -> bool {
    let Some(schluessel) = empfaenger.zustand.schluessel() else {
        return false;
    };
    match verschluesseln(nachricht, schluessel) {
        Ok(frame) => empfaenger.sender.senden(frame),
        Err(e) => {
            tracing::error!(verbindung = %empfaenger.id, fehler = %e, "Verschluesselung fehlgeschlagen");
            false
        }
    }
}

/// Schickt jedem aktiven Mitglied die Liste der uebrigen Mitglieder
///
/// Gibt die Anzahl der erreichten Mitglieder zurueck.
pub fn mitgliederliste_senden(tabellen: &RelayTabellen, channel: &ChannelName) -> usize {
    let mitglieder = tabellen.mitglieder(channel);
    let mut erreicht = 0;

    for mitglied in mitglieder {
        let Some(eintrag) = tabellen.aktives_mitglied(mitglied.as_str(), channel) else {
            continue;
        };
        let andere: Vec<ConnectionId> = mitglieder
            .iter()
            .filter(|m| *m != mitglied)
            .cloned()
            .collect();
        if verschluesselt_senden(eintrag, &ServerNachricht::MitgliederListe { p: andere }) {
            erreicht += 1;
        }
    }

    tracing::trace!(channel = %channel, erreicht, "Mitgliederliste verteilt");
    erreicht
}
