//! Channel-Handler – Beitritt
//!
//! Das Verlassen eines Channels gibt es nur implizit ueber das Trennen der
//! Verbindung, siehe `SignalingState::verbindung_entfernen`.

use hinterzimmer_core::{ChannelName, ConnectionId};

use crate::broadcast::mitgliederliste_senden;
use crate::server_state::SignalingState;

/// Behandelt `j`
///
/// Nur der erste Beitritt einer Verbindung zaehlt; danach bekommt jedes
/// Mitglied die aktuelle Liste der anderen.
pub fn handle_channel_join(
    state: &SignalingState,
    absender: &ConnectionId,
    channel: &ChannelName,
) -> bool {
    let mut tabellen = state.tabellen();
    if !tabellen.beitreten(absender, channel) {
        tracing::debug!(verbindung = %absender, channel = %channel, "Beitritt ignoriert");
        state.beobachter.verworfen("beitritt_ignoriert");
        return false;
    }

    let erreicht = mitgliederliste_senden(&tabellen, channel);
    state.beobachter.channels_gesetzt(tabellen.channels_anzahl());

    tracing::info!(
        verbindung = %absender,
        channel = %channel,
        mitglieder = tabellen.mitglieder(channel).len(),
        erreicht,
        "Channel beigetreten"
    );
    true
}
