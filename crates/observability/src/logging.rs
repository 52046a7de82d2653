//! Logging-Setup
//!
//! Level und Format kommen aus der Konfiguration. `HZ_LOG_LEVEL` und
//! `HZ_LOG_FORMAT` ueberschreiben beides, `HZ_LOG_LEVEL` darf eine komplette
//! EnvFilter-Direktive sein (z.B. `hinterzimmer_signaling=trace,info`).

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "HZ_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "HZ_LOG_FORMAT";

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parsen(format: &str) -> Option<Self> {
        match format {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn log_level_gueltig(level: &str) -> bool {
    LEVELS.contains(&level)
}

pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::parsen(format).is_some()
}

/// Baut den Filter; eine kaputte Direktive aus der Umgebung faellt auf `level` zurueck
fn filter_bauen(env_direktive: Option<String>, level: &str) -> EnvFilter {
    env_direktive
        .and_then(|direktive| EnvFilter::try_new(direktive).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Installiert den globalen tracing-Subscriber
///
/// Schlaegt fehl, wenn bereits ein Subscriber gesetzt ist oder das Format
/// unbekannt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let filter = filter_bauen(std::env::var(LOG_LEVEL_ENV).ok(), level);
    let format_name = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| format.to_string());
    let format = LogFormat::parsen(&format_name)
        .ok_or_else(|| anyhow!("Unbekanntes Log-Format '{format_name}'"))?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .flatten_event(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}
