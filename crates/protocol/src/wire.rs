//! Klartext-Frames und Frame-Klassifikation
//!
//! Jede WebSocket-Textnachricht ist genau ein Frame. Bevor eine Verbindung
//! einen Transport-Schluessel hat, sind nur Handshake und Keepalive erlaubt,
//! danach nur Keepalive und verschluesselte Umschlaege.
//!
//! ## Frame-Arten
//!
//! ```text
//! Server -> Client   {"type":"server-key","key":"<base64 DER SPKI>"}
//! Client -> Server   <hex P-384 Public Key, unkomprimiert>
//! Server -> Client   <hex ephemerer Public Key>|<base64 RSA-Signatur>
//! beide Richtungen   ping / pong
//! beide Richtungen   <base64 IV>|<base64 Chiffretext>
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ProtokollFehler, ProtokollResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Keepalive-Anfrage des Clients
pub const KEEPALIVE_PING: &str = "ping";

/// Keepalive-Antwort des Servers
pub const KEEPALIVE_PONG: &str = "pong";

/// Obergrenze fuer Handshake-Frames (exklusiv)
pub const MAX_HANDSHAKE_BYTES: usize = 2048;

/// Obergrenze fuer Umschlag-Frames (inklusiv, 8 MiB)
pub const MAX_UMSCHLAG_BYTES: usize = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Klassifikation
// ---------------------------------------------------------------------------

/// Ergebnis der Klassifikation eines eingehenden Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameArt<'a> {
    /// Keepalive, in jedem Zustand erlaubt
    Ping,
    /// Handshake-Frame einer Verbindung ohne Schluessel
    Handshake(&'a str),
    /// Verschluesselter Umschlag einer gesicherten Verbindung
    Umschlag(&'a str),
    /// Frame ueberschreitet das Groessenlimit des aktuellen Zustands
    ZuGross,
}

/// Groessenlimits fuer eingehende Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGrenzen {
    /// Handshake-Frames muessen kuerzer sein (exklusiv)
    pub max_handshake: usize,
    /// Umschlaege duerfen hoechstens so gross sein (inklusiv)
    pub max_umschlag: usize,
}

impl Default for FrameGrenzen {
    fn default() -> Self {
        Self {
            max_handshake: MAX_HANDSHAKE_BYTES,
            max_umschlag: MAX_UMSCHLAG_BYTES,
        }
    }
}

impl FrameGrenzen {
    /// Ordnet einen Frame anhand des Verbindungszustands ein
    ///
    /// `gesichert` ist `true` sobald die Verbindung einen Transport-Schluessel hat.
    /// Gemessen wird die UTF-8-Laenge in Bytes.
    pub fn klassifizieren<'a>(&self, text: &'a str, gesichert: bool) -> FrameArt<'a> {
        if text == KEEPALIVE_PING {
            return FrameArt::Ping;
        }
        if gesichert {
            if text.len() > self.max_umschlag {
                FrameArt::ZuGross
            } else {
                FrameArt::Umschlag(text)
            }
        } else if text.len() >= self.max_handshake {
            FrameArt::ZuGross
        } else {
            FrameArt::Handshake(text)
        }
    }
}

// ---------------------------------------------------------------------------
// Server-Key
// ---------------------------------------------------------------------------

/// Erster Frame jeder Verbindung: der oeffentliche RSA-Schluessel des Servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "server-key")]
pub struct ServerKeyNachricht {
    /// Base64 des DER-kodierten SubjectPublicKeyInfo
    pub key: String,
}

impl ServerKeyNachricht {
    pub fn neu(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn zu_frame(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Handshake-Antwort
// ---------------------------------------------------------------------------

/// Antwort des Servers auf den Handshake des Clients
///
/// Wire-Form: `<hex oeffentlich>|<base64 signatur>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAntwort {
    /// Hex des ephemeren P-384 Public Keys (unkomprimiert, SEC1)
    pub oeffentlich_hex: String,
    /// Base64 der RSA-PKCS#1-v1.5-Signatur ueber die rohen Public-Key-Bytes
    pub signatur_base64: String,
}

impl HandshakeAntwort {
    pub fn zu_frame(&self) -> String {
        format!("{}|{}", self.oeffentlich_hex, self.signatur_base64)
    }

    /// Parst eine Handshake-Antwort (Client-Seite)
    pub fn parsen(frame: &str) -> ProtokollResult<Self> {
        let (oeffentlich, signatur) = frame
            .split_once('|')
            .ok_or_else(|| ProtokollFehler::format("Handshake-Antwort ohne Trennzeichen"))?;
        if oeffentlich.is_empty() || signatur.is_empty() {
            return Err(ProtokollFehler::format("Handshake-Antwort unvollstaendig"));
        }
        Ok(Self {
            oeffentlich_hex: oeffentlich.to_string(),
            signatur_base64: signatur.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
