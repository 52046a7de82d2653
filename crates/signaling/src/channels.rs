//! Channel-Mitgliedschaft
//!
//! Channels entstehen beim ersten Beitritt und verschwinden, sobald das
//! letzte Mitglied geht. Die Mitgliederliste behaelt die Beitrittsreihenfolge.

use hinterzimmer_core::{ChannelName, ConnectionId};

use crate::registry::{RelayTabellen, VerbindungsEintrag, VerbindungsZustand};

/// Ergebnis von `RelayTabellen::entfernen`
#[derive(Debug)]
pub struct Entfernt {
    pub eintrag: VerbindungsEintrag,
    /// Channel mit verbliebenen Mitgliedern, die eine neue Liste brauchen
    pub channel_mit_resten: Option<ChannelName>,
}

impl RelayTabellen {
    /// Mitglieder eines Channels in Beitrittsreihenfolge
    pub fn mitglieder(&self, channel: &ChannelName) -> &[ConnectionId] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channels_anzahl(&self) -> usize {
        self.channels.len()
    }

    /// Nimmt eine gesicherte Verbindung in einen Channel auf
    ///
    /// `false` wenn die Verbindung fehlt, keinen Schluessel hat oder schon in
    /// einem Channel ist. Der Beitritt ist einmalig.
    pub fn beitreten(&mut self, id: &ConnectionId, channel: &ChannelName) -> bool {
        let Some(eintrag) = self.verbindungen.get_mut(id) else {
            return false;
        };
        let schluessel = match &eintrag.zustand {
            VerbindungsZustand::Gesichert { schluessel } => schluessel.clone(),
            _ => return false,
        };
        eintrag.zustand = VerbindungsZustand::ImChannel {
            schluessel,
            channel: channel.clone(),
        };
        self.channels
            .entry(channel.clone())
            .or_default()
            .push(id.clone());
        true
    }

    /// Entfernt eine Verbindung samt Channel-Mitgliedschaft
    ///
    /// Leere Channels werden geloescht. Ein zweiter Aufruf fuer dieselbe ID
    /// liefert `None`.
    pub fn entfernen(&mut self, id: &ConnectionId) -> Option<Entfernt> {
        let eintrag = self.verbindungen.remove(id)?;

        let channel_mit_resten = eintrag.zustand.channel().and_then(|channel| {
            let mitglieder = self.channels.get_mut(channel)?;
            mitglieder.retain(|m| m != id);
            if mitglieder.is_empty() {
                self.channels.remove(channel);
                None
            } else {
                Some(channel.clone())
            }
        });

        Some(Entfernt {
            eintrag,
            channel_mit_resten,
        })
    }
}
