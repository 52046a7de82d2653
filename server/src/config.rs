//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use hinterzimmer_observability::logging::{log_format_gueltig, log_level_gueltig};
use hinterzimmer_protocol::FrameGrenzen;
use hinterzimmer_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Verhalten (Timeouts, Limits, Moderation)
    pub relay: RelayEinstellungen,
    /// Server-Identitaet (RSA)
    pub identitaet: IdentitaetEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Relay und Observability
    pub bind_adresse: String,
    /// Port des WebSocket-Relays
    pub ws_port: u16,
    /// Pfad der WebSocket-Route
    pub ws_pfad: String,
    /// Port fuer Metriken und Health
    pub observability_port: u16,
    /// `X-Forwarded-For`, `X-Real-IP` und `X-Client-IP` auswerten
    pub proxy_header_vertrauen: bool,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "127.0.0.1".into(),
            ws_port: 8088,
            ws_pfad: "/".into(),
            observability_port: 9300,
            proxy_header_vertrauen: true,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Stille bis zum Trennen in Millisekunden
    pub seen_timeout_ms: u64,
    /// Intervall des Hintergrund-Sweeps in Sekunden (0 = nur beim Verbindungsaufbau)
    pub sweep_intervall_sek: u64,
    /// Handshake-Frames muessen kuerzer sein
    pub max_handshake_bytes: usize,
    /// Umschlaege duerfen hoechstens so gross sein
    pub max_umschlag_bytes: usize,
    /// Send-Queue pro Verbindung
    pub sende_queue_groesse: usize,
    /// Verzoegerung zwischen `banned` und dem Trennen
    pub ban_trennung_verzoegerung_ms: u64,
    /// `ban_ip` / `unban_ip` annehmen
    pub moderation_aktiviert: bool,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            seen_timeout_ms: 60_000,
            sweep_intervall_sek: 0,
            max_handshake_bytes: standard.frame_grenzen.max_handshake,
            max_umschlag_bytes: standard.frame_grenzen.max_umschlag,
            sende_queue_groesse: standard.sende_queue_groesse,
            ban_trennung_verzoegerung_ms: 1000,
            moderation_aktiviert: false,
        }
    }
}

/// Identitaets-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitaetEinstellungen {
    /// Schluessellaenge des RSA-Schluessels
    pub rsa_bits: usize,
    /// JSON-Datei fuer die Identitaet (leer = nur im Speicher)
    pub speicher_pfad: Option<PathBuf>,
    /// Alter in Stunden, ab dem rotiert wird (leer = nie)
    pub max_alter_stunden: Option<u64>,
}

impl Default for IdentitaetEinstellungen {
    fn default() -> Self {
        Self {
            rsa_bits: hinterzimmer_crypto::STANDARD_RSA_BITS,
            speicher_pfad: None,
            max_alter_stunden: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Unbekannter Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        if !self.netzwerk.ws_pfad.starts_with('/') {
            anyhow::bail!("ws_pfad muss mit '/' beginnen: '{}'", self.netzwerk.ws_pfad);
        }
        if self.relay.max_handshake_bytes == 0 || self.relay.max_umschlag_bytes == 0 {
            anyhow::bail!("Frame-Limits muessen groesser als 0 sein");
        }
        if self.relay.sende_queue_groesse == 0 {
            anyhow::bail!("sende_queue_groesse muss groesser als 0 sein");
        }
        self.ws_bind_adresse()?;
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den WebSocket-Relay zurueck
    pub fn ws_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.ws_port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!(
            "{}:{}",
            self.netzwerk.bind_adresse, self.netzwerk.observability_port
        );
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    /// Uebersetzt die Relay-Einstellungen in die Signaling-Konfiguration
    pub fn signaling_config(&self) -> SignalingConfig {
        let relay = &self.relay;
        SignalingConfig {
            seen_timeout: Duration::from_millis(relay.seen_timeout_ms),
            sweep_intervall: (relay.sweep_intervall_sek > 0)
                .then(|| Duration::from_secs(relay.sweep_intervall_sek)),
            frame_grenzen: FrameGrenzen {
                max_handshake: relay.max_handshake_bytes,
                max_umschlag: relay.max_umschlag_bytes,
            },
            sende_queue_groesse: relay.sende_queue_groesse,
            ban_trennung_verzoegerung: Duration::from_millis(relay.ban_trennung_verzoegerung_ms),
            moderation_aktiviert: relay.moderation_aktiviert,
            proxy_header_vertrauen: self.netzwerk.proxy_header_vertrauen,
        }
    }

    /// Maximales Alter der Identitaet, `None` = keine Rotation
    pub fn identitaet_max_alter(&self) -> Option<chrono::Duration> {
        self.identitaet
            .max_alter_stunden
            .and_then(|stunden| i64::try_from(stunden).ok())
            .and_then(chrono::Duration::try_hours)
    }
}
