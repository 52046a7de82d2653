//! Message-Dispatcher – Routet Client-Aktionen an die richtigen Handler
//!
//! Der Dispatcher bekommt bereits validierte `ClientAktion`en von einer
//! `ClientConnection`. Antworten gehen nicht zurueck an den Aufrufer,
//! sondern werden von den Handlern in die Send-Queues der Empfaenger gelegt.
//!
//! ## Moderation
//! `ban_ip` und `unban_ip` werden nur bei `moderation_aktiviert` verarbeitet;
//! sonst werden sie wie unbekannte Aktionen verworfen.

use std::sync::Arc;

use hinterzimmer_core::ConnectionId;
use hinterzimmer_protocol::ClientAktion;

use crate::handlers::{channel_handler, message_handler, moderation_handler};
use crate::server_state::SignalingState;

/// Zentraler Message-Dispatcher
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine Aktion der Verbindung `absender`
    pub fn dispatch(&self, aktion: ClientAktion, absender: &ConnectionId) {
        tracing::trace!(verbindung = %absender, aktion = aktion.tag(), "Aktion empfangen");

        match aktion {
            ClientAktion::Beitreten { channel } => {
                channel_handler::handle_channel_join(&self.state, absender, &channel);
            }
            ClientAktion::Direkt { payload, ziel } => {
                message_handler::handle_direkt(&self.state, absender, &ziel, payload);
            }
            ClientAktion::Rundruf { payloads } => {
                message_handler::handle_rundruf(&self.state, absender, payloads);
            }

            // -------------------------------------------------------------------
            // Moderation (abschaltbar)
            // -------------------------------------------------------------------
            aktion @ (ClientAktion::BanIp { .. } | ClientAktion::UnbanIp { .. })
                if !self.state.config.moderation_aktiviert =>
            {
                tracing::debug!(
                    verbindung = %absender,
                    aktion = aktion.tag(),
                    "Moderation deaktiviert – Aktion verworfen"
                );
                self.state.beobachter.verworfen("moderation_deaktiviert");
            }
            ClientAktion::BanIp {
                ziel,
                dauer_min,
                grund,
            } => {
                moderation_handler::handle_ban_ip(&self.state, absender, &ziel, dauer_min, &grund);
            }
            ClientAktion::UnbanIp { ziel } => {
                moderation_handler::handle_unban_ip(&self.state, absender, &ziel);
            }
        }
    }
}
