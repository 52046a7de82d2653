//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Frames laufen synchron durch `frame_verarbeiten`,
//! ausgehende kommen aus dem `Postfach` der Verbindung.
//!
//! ## Ablauf
//! ```text
//! annehmen -> server-key -> Handshake -> Umschlaege ... -> Cleanup
//! ```
//!
//! ## Keepalive
//! - Der Client sendet `ping`, der Server antwortet `pong`
//! - Jeder Frame zaehlt als Lebenszeichen
//! - Stille Verbindungen werden beim naechsten Sweep getrennt

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use hinterzimmer_core::ConnectionId;
use hinterzimmer_crypto::{handshake_durchfuehren, ServerIdentitaet};
use hinterzimmer_protocol::wire::KEEPALIVE_PONG;
use hinterzimmer_protocol::{entschluesseln, ClientAktion, FrameArt, TransportSchluessel};
use tokio::sync::watch;

use crate::beobachter::HandshakeErgebnis;
use crate::broadcast::{ClientSender, Postfach};
use crate::dispatcher::MessageDispatcher;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::VerbindungsZustand;
use crate::server_state::SignalingState;

/// Was nach einem eingehenden Frame mit der Verbindung passiert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFolge {
    Weiter,
    Schliessen,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    id: ConnectionId,
    quelle: String,
    sender: ClientSender,
    /// Die Identitaet, deren Schluessel im `server-key` dieser Verbindung stand
    identitaet: Arc<ServerIdentitaet>,
    dispatcher: MessageDispatcher,
}

impl ClientConnection {
    /// Registriert eine neue Verbindung
    ///
    /// Der `server-key`-Frame liegt danach bereits im Postfach. Gesperrte
    /// Quelladressen werden hier abgelehnt.
    pub fn annehmen(state: Arc<SignalingState>, quelle: String) -> SignalingResult<(Self, Postfach)> {
        let neu = state.verbindung_registrieren(&quelle)?;
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        Ok((
            Self {
                state,
                id: neu.id,
                quelle,
                sender: neu.sender,
                identitaet: neu.identitaet,
                dispatcher,
            },
            neu.postfach,
        ))
    }

    /// Wie `annehmen`, aber auf dem Blocking-Pool
    ///
    /// Beim Aufbau kann eine RSA-Identitaet erzeugt oder rotiert werden;
    /// das darf keinen Runtime-Worker belegen.
    pub async fn annehmen_blockierfrei(
        state: Arc<SignalingState>,
        quelle: String,
    ) -> SignalingResult<(Self, Postfach)> {
        tokio::task::spawn_blocking(move || Self::annehmen(state, quelle))
            .await
            .map_err(|e| SignalingError::intern(format!("Verbindungsaufbau abgebrochen: {e}")))?
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Verarbeitet einen eingehenden Text-Frame
    pub fn frame_verarbeiten(&self, text: &str) -> FrameFolge {
        let schluessel = {
            let mut tabellen = self.state.tabellen();
            let Some(eintrag) = tabellen.get_mut(&self.id) else {
                // Bereits verdraengt
                return FrameFolge::Schliessen;
            };
            eintrag.zuletzt_gesehen = Instant::now();
            eintrag.zustand.schluessel().cloned()
        };

        let art = self
            .state
            .config
            .frame_grenzen
            .klassifizieren(text, schluessel.is_some());

        match (art, schluessel) {
            (FrameArt::Ping, _) => {
                self.sender.senden(KEEPALIVE_PONG.to_string());
                FrameFolge::Weiter
            }
            (FrameArt::ZuGross, _) => {
                tracing::debug!(verbindung = %self.id, bytes = text.len(), "Frame zu gross – verworfen");
                self.state.beobachter.verworfen("zu_gross");
                FrameFolge::Weiter
            }
            (FrameArt::Handshake(client_hex), _) => self.handshake(client_hex),
            (FrameArt::Umschlag(umschlag), Some(schluessel)) => {
                self.umschlag(umschlag, &schluessel);
                FrameFolge::Weiter
            }
            // klassifizieren liefert Umschlag nur mit Schluessel
            (FrameArt::Umschlag(_), None) => FrameFolge::Weiter,
        }
    }

    fn handshake(&self, client_hex: &str) -> FrameFolge {
        let (schluessel, antwort) = match handshake_durchfuehren(&self.identitaet, client_hex) {
            Ok(ergebnis) => ergebnis,
            Err(e) => {
                tracing::warn!(
                    verbindung = %self.id,
                    fehler = %e,
                    "Handshake fehlgeschlagen – Verbindung wird geschlossen"
                );
                self.state.beobachter.handshake(HandshakeErgebnis::Fehler);
                return FrameFolge::Schliessen;
            }
        };

        let mut tabellen = self.state.tabellen();
        let Some(eintrag) = tabellen.get_mut(&self.id) else {
            return FrameFolge::Schliessen;
        };
        eintrag.zustand = VerbindungsZustand::Gesichert { schluessel };
        eintrag.sender.senden(antwort.zu_frame());
        drop(tabellen);

        self.state.beobachter.handshake(HandshakeErgebnis::Erfolg);
        tracing::debug!(verbindung = %self.id, "Handshake abgeschlossen");
        FrameFolge::Weiter
    }

    fn umschlag(&self, umschlag: &str, schluessel: &TransportSchluessel) {
        let wert = match entschluesseln(umschlag, schluessel) {
            Ok(wert) => wert,
            Err(e) => {
                tracing::debug!(verbindung = %self.id, fehler = %e, "Umschlag nicht lesbar – verworfen");
                self.state.beobachter.verworfen("entschluesselung");
                return;
            }
        };

        match ClientAktion::aus_wert(&wert) {
            Ok(aktion) => self.dispatcher.dispatch(aktion, &self.id),
            Err(grund) => {
                tracing::debug!(verbindung = %self.id, grund = %grund, "Aktion verworfen");
                self.state.beobachter.verworfen(grund.label());
            }
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, die Verbindung verdraengt wird oder ein
    /// Shutdown-Signal eingeht. Danach wird die Verbindung aus den Tabellen
    /// entfernt.
    pub async fn verarbeiten(
        self,
        socket: WebSocket,
        postfach: Postfach,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let Postfach {
            mut empfaenger,
            schliessen,
        } = postfach;

        tracing::info!(verbindung = %self.id, quelle = %self.quelle, "Neue Verbindung");

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                eingang = ws_rx.next() => {
                    let text = match eingang {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(daten))) => match String::from_utf8(daten) {
                            Ok(text) => text,
                            Err(_) => {
                                tracing::debug!(verbindung = %self.id, "Binaerframe ohne UTF-8 – verworfen");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(verbindung = %self.id, "Verbindung vom Client getrennt");
                            break;
                        }
                        // WebSocket-Ping/Pong beantwortet axum selbst
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(verbindung = %self.id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                    };
                    if self.frame_verarbeiten(&text) == FrameFolge::Schliessen {
                        break;
                    }
                }

                // Ausgehender Frame aus der Send-Queue
                Some(frame) = empfaenger.recv() => {
                    if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                        tracing::warn!(verbindung = %self.id, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Verdraengt (Sweep oder Sperre)
                _ = schliessen.notified() => {
                    tracing::debug!(verbindung = %self.id, "Schliessen angefordert");
                    break;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(verbindung = %self.id, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        // Bereits eingereihte Frames (z.B. `banned`) noch zustellen
        while let Ok(frame) = empfaenger.try_recv() {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;

        self.state.verbindung_entfernen(&self.id);
        tracing::info!(verbindung = %self.id, "Verbindungs-Task beendet");
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("quelle", &self.quelle)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bans::SpeicherBanStore;
    use crate::beobachter::KeinBeobachter;
    use crate::server_state::tests::test_state;
    use crate::server_state::SignalingConfig;
    use hinterzimmer_crypto::{ClientHandshake, FluechtigerSpeicher, IdentitaetsVerwalter};
    use hinterzimmer_protocol::{verschluesseln, FrameGrenzen, HandshakeAntwort, ServerKeyNachricht};
    use serde_json::json;

    /// Baut eine Verbindung bis zum gesicherten Zustand auf
    async fn gesichert(state: &Arc<SignalingState>) -> (ClientConnection, Postfach, TransportSchluessel) {
        let (verbindung, mut postfach) =
            ClientConnection::annehmen(Arc::clone(state), "10.0.0.1".into()).unwrap();
        let server_key: ServerKeyNachricht =
            serde_json::from_str(&postfach.empfaenger.recv().await.unwrap()).unwrap();

        let client = ClientHandshake::neu();
        assert_eq!(verbindung.frame_verarbeiten(client.oeffentlich_hex()), FrameFolge::Weiter);
        let antwort = HandshakeAntwort::parsen(&postfach.empfaenger.recv().await.unwrap()).unwrap();
        let schluessel = client.abschliessen(&antwort, &server_key.key).unwrap();
        (verbindung, postfach, schluessel)
    }

    #[tokio::test]
    async fn ping_in_jedem_zustand() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach) =
            ClientConnection::annehmen(Arc::clone(&state), "10.0.0.1".into()).unwrap();
        postfach.empfaenger.recv().await.unwrap();

        assert_eq!(verbindung.frame_verarbeiten("ping"), FrameFolge::Weiter);
        assert_eq!(postfach.empfaenger.recv().await.unwrap(), "pong");

        let (verbindung, mut postfach, _) = gesichert(&state).await;
        assert_eq!(verbindung.frame_verarbeiten("ping"), FrameFolge::Weiter);
        assert_eq!(postfach.empfaenger.recv().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn handshake_liefert_gleichen_schluessel() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach, schluessel) = gesichert(&state).await;

        // Server verschluesselt mit seinem Schluessel, Client liest mit seinem
        let channel = json!({"a": "j", "p": "room1"});
        let umschlag = verschluesseln(&channel, &schluessel).unwrap();
        assert_eq!(verbindung.frame_verarbeiten(&umschlag), FrameFolge::Weiter);

        let liste = entschluesseln(&postfach.empfaenger.recv().await.unwrap(), &schluessel).unwrap();
        assert_eq!(liste, json!({"a": "l", "p": []}));
    }

    #[tokio::test]
    async fn kaputter_handshake_schliesst() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach) =
            ClientConnection::annehmen(Arc::clone(&state), "10.0.0.1".into()).unwrap();
        postfach.empfaenger.recv().await.unwrap();

        assert_eq!(verbindung.frame_verarbeiten("04abcd"), FrameFolge::Schliessen);
        assert_eq!(verbindung.frame_verarbeiten("kein hex"), FrameFolge::Schliessen);
    }

    #[tokio::test]
    async fn zu_grosser_handshake_wird_ignoriert() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach) =
            ClientConnection::annehmen(Arc::clone(&state), "10.0.0.1".into()).unwrap();
        postfach.empfaenger.recv().await.unwrap();

        let riesig = "a".repeat(2048);
        assert_eq!(verbindung.frame_verarbeiten(&riesig), FrameFolge::Weiter);
        assert!(postfach.empfaenger.try_recv().is_err());
        assert!(!state.tabellen().get(verbindung.id()).unwrap().zustand.ist_gesichert());
    }

    #[tokio::test]
    async fn zweiter_handshake_gilt_als_umschlag() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach, schluessel) = gesichert(&state).await;

        let client = ClientHandshake::neu();
        assert_eq!(verbindung.frame_verarbeiten(client.oeffentlich_hex()), FrameFolge::Weiter);
        assert!(postfach.empfaenger.try_recv().is_err());
        assert_eq!(
            state.tabellen().get(verbindung.id()).unwrap().zustand.schluessel(),
            Some(&schluessel)
        );
    }

    #[tokio::test]
    async fn unlesbarer_umschlag_wird_verworfen() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, mut postfach, _) = gesichert(&state).await;

        assert_eq!(verbindung.frame_verarbeiten("kein|umschlag"), FrameFolge::Weiter);
        let fremd = verschluesseln(&json!({"a": "j", "p": "x"}), &TransportSchluessel::aus_bytes([9; 32])).unwrap();
        assert_eq!(verbindung.frame_verarbeiten(&fremd), FrameFolge::Weiter);
        assert!(postfach.empfaenger.try_recv().is_err());
    }

    #[tokio::test]
    async fn zu_grosser_umschlag_laesst_verbindung_gesichert() {
        let state = test_state(SignalingConfig {
            frame_grenzen: FrameGrenzen {
                max_umschlag: 256,
                ..FrameGrenzen::default()
            },
            ..SignalingConfig::default()
        });
        let (verbindung, mut postfach, schluessel) = gesichert(&state).await;

        let gross = verschluesseln(&json!({"a": "j", "p": "r".repeat(300)}), &schluessel).unwrap();
        assert!(gross.len() > 256);
        assert_eq!(verbindung.frame_verarbeiten(&gross), FrameFolge::Weiter);
        assert!(postfach.empfaenger.try_recv().is_err());
        assert_eq!(state.channels_anzahl(), 0);

        let beitritt = verschluesseln(&json!({"a": "j", "p": "room1"}), &schluessel).unwrap();
        assert!(beitritt.len() <= 256);
        assert_eq!(verbindung.frame_verarbeiten(&beitritt), FrameFolge::Weiter);

        let liste = entschluesseln(&postfach.empfaenger.recv().await.unwrap(), &schluessel).unwrap();
        assert_eq!(liste, json!({"a": "l", "p": []}));
        let room1 = hinterzimmer_core::ChannelName::neu("room1").unwrap();
        assert_eq!(state.channel_mitglieder(&room1), vec![verbindung.id().clone()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn schluesselerzeugung_beim_aufbau_blockiert_runtime_nicht() {
        // Leerer Speicher: der erste Aufbau erzeugt eine RSA-Identitaet
        let state = SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(IdentitaetsVerwalter::neu(Arc::new(FluechtigerSpeicher::neu()), 1024, None)),
            Arc::new(SpeicherBanStore::neu()),
            Arc::new(KeinBeobachter),
        );

        let aufbau = tokio::spawn(ClientConnection::annehmen_blockierfrei(
            Arc::clone(&state),
            "10.0.0.1".into(),
        ));
        let mut runden = 0u64;
        while !aufbau.is_finished() {
            tokio::task::yield_now().await;
            runden += 1;
        }
        assert!(runden > 1, "Runtime stand waehrend der Erzeugung still");

        let (_verbindung, mut postfach) = aufbau.await.unwrap().unwrap();
        let frame = postfach.empfaenger.recv().await.unwrap();
        assert!(frame.starts_with(r#"{"type":"server-key""#));
        assert_eq!(state.verbindungen_anzahl(), 1);
    }

    #[tokio::test]
    async fn verdraengte_verbindung_schliesst_beim_naechsten_frame() {
        let state = test_state(SignalingConfig::default());
        let (verbindung, _postfach, _) = gesichert(&state).await;

        state.verbindung_trennen(verbindung.id());
        assert_eq!(verbindung.frame_verarbeiten("ping"), FrameFolge::Schliessen);
    }
}
