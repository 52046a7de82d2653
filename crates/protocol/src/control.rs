//! Umschlag-Aktionen
//!
//! Definiert die Nachrichten im Inneren eines entschluesselten Umschlags.
//!
//! ## Design
//! - Eingehende Aktionen werden aus einem `serde_json::Value` validiert statt
//!   per derive deserialisiert: leere Strings gelten als fehlend, und
//!   ungueltige Eintraege einer Rundruf-Map werden einzeln uebersprungen.
//! - Ausgehende Nachrichten sind ein getaggtes Enum (`a` = Aktions-Tag).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hinterzimmer_core::{ChannelName, ConnectionId};

// ---------------------------------------------------------------------------
// Verwurf-Gruende
// ---------------------------------------------------------------------------

/// Warum ein Umschlag ohne Wirkung verworfen wurde
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerwurfGrund {
    /// Klartext ist kein JSON-Objekt
    KeinObjekt,
    /// `a` fehlt oder ist kein nicht-leerer String
    KeineAktion,
    /// Unbekanntes Aktions-Tag
    UnbekannteAktion(String),
    /// Aktion bekannt, Nutzlast ungueltig
    UngueltigeNutzlast(&'static str),
}

impl VerwurfGrund {
    /// Stabiles Label fuer Metriken
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeinObjekt => "kein_objekt",
            Self::KeineAktion => "keine_aktion",
            Self::UnbekannteAktion(_) => "unbekannte_aktion",
            Self::UngueltigeNutzlast(_) => "ungueltige_nutzlast",
        }
    }
}

impl std::fmt::Display for VerwurfGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeinObjekt => write!(f, "Umschlag ist kein JSON-Objekt"),
            Self::KeineAktion => write!(f, "Aktions-Tag fehlt"),
            Self::UnbekannteAktion(a) => write!(f, "Unbekannte Aktion '{a}'"),
            Self::UngueltigeNutzlast(was) => write!(f, "Ungueltige Nutzlast: {was}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Validierte Aktion eines Clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAktion {
    /// `j`: einem Channel beitreten
    Beitreten { channel: ChannelName },
    /// `c`: opake Nutzlast an genau ein Channel-Mitglied
    Direkt { payload: String, ziel: String },
    /// `w`: pro Empfaenger eigene Nutzlast
    Rundruf { payloads: Vec<(String, String)> },
    /// `ban_ip`: Quelladresse der Ziel-Verbindung sperren
    BanIp {
        ziel: String,
        /// Minuten, 0 = dauerhaft
        dauer_min: u64,
        grund: String,
    },
    /// `unban_ip`: Sperre der Quelladresse der Ziel-Verbindung aufheben
    UnbanIp { ziel: String },
}

impl ClientAktion {
    /// Tag der Aktion auf dem Draht
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Beitreten { .. } => "j",
            Self::Direkt { .. } => "c",
            Self::Rundruf { .. } => "w",
            Self::BanIp { .. } => "ban_ip",
            Self::UnbanIp { .. } => "unban_ip",
        }
    }

    /// Validiert einen entschluesselten Umschlag
    pub fn aus_wert(wert: &Value) -> Result<Self, VerwurfGrund> {
        let objekt = wert.as_object().ok_or(VerwurfGrund::KeinObjekt)?;
        let aktion = nicht_leer(objekt, "a").ok_or(VerwurfGrund::KeineAktion)?;

        match aktion {
            "j" => {
                let channel = nicht_leer(objekt, "p")
                    .and_then(ChannelName::neu)
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("p muss ein Channel-Name sein"))?;
                Ok(Self::Beitreten { channel })
            }
            "c" => {
                let payload = nicht_leer(objekt, "p")
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("p fehlt"))?;
                let ziel = nicht_leer(objekt, "c")
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("c fehlt"))?;
                Ok(Self::Direkt {
                    payload: payload.to_string(),
                    ziel: ziel.to_string(),
                })
            }
            "w" => {
                let map = objekt
                    .get("p")
                    .and_then(Value::as_object)
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("p muss ein Objekt sein"))?;
                let payloads = map
                    .iter()
                    .filter_map(|(ziel, nutzlast)| match nutzlast.as_str() {
                        Some(s) if !s.is_empty() => Some((ziel.clone(), s.to_string())),
                        _ => None,
                    })
                    .collect();
                Ok(Self::Rundruf { payloads })
            }
            "ban_ip" => {
                let ziel = nicht_leer(objekt, "t")
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("t fehlt"))?;
                let dauer_min = match objekt.get("d") {
                    None | Some(Value::Null) => 0,
                    Some(d) => minuten_lesen(d)
                        .ok_or(VerwurfGrund::UngueltigeNutzlast("d muss eine Minutenzahl sein"))?,
                };
                let grund = objekt
                    .get("r")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(Self::BanIp {
                    ziel: ziel.to_string(),
                    dauer_min,
                    grund: grund.to_string(),
                })
            }
            "unban_ip" => {
                let ziel = nicht_leer(objekt, "t")
                    .ok_or(VerwurfGrund::UngueltigeNutzlast("t fehlt"))?;
                Ok(Self::UnbanIp {
                    ziel: ziel.to_string(),
                })
            }
            andere => Err(VerwurfGrund::UnbekannteAktion(andere.to_string())),
        }
    }
}

/// Minutenzahl aus einer JSON-Zahl, Bruchteile werden abgeschnitten
fn minuten_lesen(wert: &Value) -> Option<u64> {
    if let Some(minuten) = wert.as_u64() {
        return Some(minuten);
    }
    let minuten = wert.as_f64()?;
    (minuten.is_finite() && minuten >= 0.0).then(|| minuten.trunc() as u64)
}

/// Liefert ein Feld nur wenn es ein nicht-leerer String ist
fn nicht_leer<'a>(objekt: &'a Map<String, Value>, feld: &str) -> Option<&'a str> {
    objekt
        .get(feld)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Details einer Sperre, wie sie der gesperrte Client sieht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanDetails {
    /// Minuten, 0 = dauerhaft
    pub duration: u64,
    pub reason: String,
}

/// Nachrichten die der Server in Umschlaegen verschickt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum ServerNachricht {
    /// Weitergeleitete Nutzlast, `c` ist der Absender
    #[serde(rename = "c")]
    Weitergeleitet { p: String, c: ConnectionId },

    /// Aktuelle Mitglieder des Channels ohne den Empfaenger selbst
    #[serde(rename = "l")]
    MitgliederListe { p: Vec<ConnectionId> },

    /// Die Quelladresse dieser Verbindung wurde gesperrt
    #[serde(rename = "banned")]
    Gebannt { d: BanDetails },

    /// Bestaetigung an den Ausloeser einer Sperre
    #[serde(rename = "ban_result")]
    BanErgebnis { s: bool, ip: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
