//! Gemeinsamer Relay-Zustand
//!
//! Haelt Konfiguration, Tabellen und die geteilten Services als
//! Arc-Referenzen, die sicher zwischen tokio-Tasks geteilt werden koennen.
//!
//! ## Sperrdisziplin
//! Alle Verbindungen und Channels liegen in einer `RelayTabellen`-Struktur
//! hinter genau einem `parking_lot::Mutex`. Die Sperre wird nie ueber ein
//! `.await` gehalten; teure Kryptografie (Handshake, Entschluesselung
//! eingehender Frames) laeuft ausserhalb.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hinterzimmer_core::{ChannelName, ConnectionId};
use hinterzimmer_crypto::{IdentitaetsVerwalter, RotationsErgebnis, ServerIdentitaet};
use hinterzimmer_protocol::{FrameGrenzen, ServerKeyNachricht};
use parking_lot::{Mutex, MutexGuard};

use crate::bans::BanStore;
use crate::beobachter::RelayBeobachter;
use crate::broadcast::{mitgliederliste_senden, ClientSender, Postfach};
use crate::channels::Entfernt;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::{RelayTabellen, VerbindungsEintrag};

/// Konfiguration fuer den Relay
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Verbindungen ohne Frame seit dieser Dauer werden getrennt
    pub seen_timeout: Duration,
    /// Intervall des Hintergrund-Sweeps (`None` = nur beim Verbindungsaufbau)
    pub sweep_intervall: Option<Duration>,
    /// Groessenlimits fuer Handshake und Umschlag
    pub frame_grenzen: FrameGrenzen,
    /// Groesse der Send-Queue pro Verbindung
    pub sende_queue_groesse: usize,
    /// Verzoegerung zwischen `banned` und dem Trennen
    pub ban_trennung_verzoegerung: Duration,
    /// `ban_ip`/`unban_ip` annehmen
    pub moderation_aktiviert: bool,
    /// `X-Forwarded-For`, `X-Real-IP` und `X-Client-IP` auswerten
    pub proxy_header_vertrauen: bool,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            seen_timeout: Duration::from_millis(60_000),
            sweep_intervall: None,
            frame_grenzen: FrameGrenzen::default(),
            sende_queue_groesse: 256,
            ban_trennung_verzoegerung: Duration::from_millis(1000),
            moderation_aktiviert: false,
            proxy_header_vertrauen: true,
        }
    }
}

/// Ergebnis einer erfolgreichen Registrierung
#[derive(Debug)]
pub struct NeueVerbindung {
    /// `identitaet` ist die Identitaet, deren Schluessel im `server-key`
    /// steht; der Handshake dieser Verbindung wird damit signiert.
    pub id: ConnectionId,
    pub sender: ClientSender,
    pub postfach: Postfach,
    pub identitaet: Arc<ServerIdentitaet>,
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Relay-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Verbindungen und Channels
    tabellen: Mutex<RelayTabellen>,
    /// Server-Identitaet (RSA), laden und rotieren
    pub identitaeten: Arc<IdentitaetsVerwalter>,
    /// IP-Sperren
    pub bans: Arc<dyn BanStore>,
    /// Metriken
    pub beobachter: Arc<dyn RelayBeobachter>,
    /// Startzeitpunkt des Relays (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        identitaeten: Arc<IdentitaetsVerwalter>,
        bans: Arc<dyn BanStore>,
        beobachter: Arc<dyn RelayBeobachter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            tabellen: Mutex::new(RelayTabellen::neu()),
            identitaeten,
            bans,
            beobachter,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub(crate) fn tabellen(&self) -> MutexGuard<'_, RelayTabellen> {
        self.tabellen.lock()
    }

    /// Anzahl lebender Verbindungen
    pub fn verbindungen_anzahl(&self) -> usize {
        self.tabellen().anzahl()
    }

    /// Anzahl nicht-leerer Channels
    pub fn channels_anzahl(&self) -> usize {
        self.tabellen().channels_anzahl()
    }

    /// Mitglieder eines Channels in Beitrittsreihenfolge
    pub fn channel_mitglieder(&self, channel: &ChannelName) -> Vec<ConnectionId> {
        self.tabellen().mitglieder(channel).to_vec()
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Nimmt eine neue Verbindung auf
    ///
    /// Reihenfolge: Sperre pruefen, veraltete Verbindungen trennen,
    /// Identitaet pflegen, ID ziehen, `server-key` einreihen, registrieren.
    /// Der `server-key`-Frame liegt danach als erster Frame im Postfach.
    pub fn verbindung_registrieren(&self, quelle: &str) -> SignalingResult<NeueVerbindung> {
        if self.bans.ist_gebannt(quelle) {
            tracing::info!(quelle, "Verbindung von gesperrter Adresse abgelehnt");
            return Err(SignalingError::Gebannt(quelle.to_string()));
        }

        self.veraltete_trennen();
        self.identitaet_pflegen();

        let identitaet = self.identitaeten.laden_oder_erzeugen()?;
        let server_key = ServerKeyNachricht::neu(identitaet.oeffentlich_base64()).zu_frame()?;

        let mut tabellen = self.tabellen();
        let id = tabellen.freie_id(ConnectionId::zufaellig);
        let (sender, postfach) = ClientSender::neu(id.clone(), self.config.sende_queue_groesse);
        sender.senden(server_key);

        // Unter derselben Sperre gezogen, die ID ist also noch frei
        let eingefuegt = tabellen
            .einfuegen(VerbindungsEintrag::neu(id.clone(), quelle.to_string(), sender.clone()))
            .is_ok();
        debug_assert!(eingefuegt);
        self.beobachter.verbindungen_gesetzt(tabellen.anzahl());
        drop(tabellen);

        tracing::debug!(verbindung = %id, quelle, "Verbindung registriert");
        Ok(NeueVerbindung {
            id,
            sender,
            postfach,
            identitaet,
        })
    }

    /// Rotiert die Identitaet wenn faellig und keine Verbindung lebt
    ///
    /// Fehler werden geloggt; die bisherige Identitaet bleibt dann in Gebrauch.
    pub fn identitaet_pflegen(&self) {
        let aktive = self.verbindungen_anzahl();
        match self.identitaeten.rotieren_wenn_leerlauf(aktive) {
            Ok(RotationsErgebnis::Rotiert) => {
                tracing::info!("Server-Identitaet im Leerlauf erneuert");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(fehler = %e, "Rotation der Server-Identitaet fehlgeschlagen");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verbindungsabbau
    // -----------------------------------------------------------------------

    /// Entfernt eine Verbindung nach regulaerem Schliessen
    ///
    /// Verbliebene Channel-Mitglieder bekommen eine neue Liste. Idempotent:
    /// `false` wenn die Verbindung schon weg war.
    pub fn verbindung_entfernen(&self, id: &ConnectionId) -> bool {
        let mut tabellen = self.tabellen();
        let entfernt = self.entfernen_und_melden(&mut tabellen, id).is_some();
        if entfernt {
            tracing::debug!(verbindung = %id, "Verbindung entfernt");
        }
        entfernt
    }

    /// Entfernt eine Verbindung und schliesst ihren Socket
    pub fn verbindung_trennen(&self, id: &ConnectionId) -> bool {
        let mut tabellen = self.tabellen();
        match self.entfernen_und_melden(&mut tabellen, id) {
            Some(entfernt) => {
                entfernt.eintrag.sender.schliessen();
                self.beobachter.verdraengt(1);
                tracing::info!(verbindung = %id, "Verbindung zwangsweise getrennt");
                true
            }
            None => false,
        }
    }

    /// Trennt alle Verbindungen, die laenger als `seen_timeout` still waren
    pub fn veraltete_trennen(&self) -> usize {
        self.veraltete_trennen_bei(Instant::now())
    }

    /// Wie `veraltete_trennen`, aber mit festem Bezugszeitpunkt
    pub fn veraltete_trennen_bei(&self, jetzt: Instant) -> usize {
        let Some(grenze) = jetzt.checked_sub(self.config.seen_timeout) else {
            return 0;
        };

        let mut tabellen = self.tabellen();
        let veraltet = tabellen.veraltete(grenze);
        for id in &veraltet {
            if let Some(entfernt) = self.entfernen_und_melden(&mut tabellen, id) {
                tracing::debug!(verbindung = %id, "Verbindung ohne Lebenszeichen getrennt");
                entfernt.eintrag.sender.schliessen();
            }
        }

        if !veraltet.is_empty() {
            self.beobachter.verdraengt(veraltet.len());
            tracing::info!(anzahl = veraltet.len(), "Veraltete Verbindungen getrennt");
        }
        veraltet.len()
    }

    fn entfernen_und_melden(
        &self,
        tabellen: &mut RelayTabellen,
        id: &ConnectionId,
    ) -> Option<Entfernt> {
        let entfernt = tabellen.entfernen(id)?;
        if let Some(channel) = &entfernt.channel_mit_resten {
            mitgliederliste_senden(tabellen, channel);
        }
        self.beobachter.verbindungen_gesetzt(tabellen.anzahl());
        self.beobachter.channels_gesetzt(tabellen.channels_anzahl());
        Some(entfernt)
    }
}

impl std::fmt::Debug for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingState")
            .field("config", &self.config)
            .field("verbindungen", &self.verbindungen_anzahl())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
