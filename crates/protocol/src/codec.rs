//! Transport-Codec fuer verschluesselte Umschlaege
//!
//! Jeder Umschlag wird mit dem Transport-Schluessel der jeweiligen
//! Verbindung verschluesselt.
//!
//! ## Frame-Format
//!
//! ```text
//! <base64 IV (16 Bytes)>|<base64 AES-256-CBC Chiffretext>
//! ```
//!
//! Der Klartext ist UTF-8-JSON, mit NUL-Bytes auf ein Vielfaches von 16
//! aufgefuellt (kein PKCS#7). Beim Entschluesseln werden alle NUL-Bytes am
//! Ende entfernt.
//!
//! ## Achtung: keine Authentifizierung
//!
//! CBC ohne MAC. Ein Angreifer auf dem Transportweg kann Chiffretexte
//! unbemerkt manipulieren. Das Format ist bitgenau mit bestehenden Clients
//! kompatibel; ein Wechsel auf AEAD waere ein inkompatibler Protokollbruch
//! und braucht eine eigene Protokollversion.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use crate::error::{ProtokollFehler, ProtokollResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// AES-Blockgroesse in Bytes
pub const BLOCK_GROESSE: usize = 16;

/// Laenge des Transport-Schluessels in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Trennzeichen zwischen IV und Chiffretext
pub const TRENNER: char = '|';

// ---------------------------------------------------------------------------
// TransportSchluessel
// ---------------------------------------------------------------------------

/// Symmetrischer 32-Byte-Schluessel einer einzelnen Verbindung
#[derive(Clone, PartialEq, Eq)]
pub struct TransportSchluessel([u8; SCHLUESSEL_LAENGE]);

impl TransportSchluessel {
    pub fn aus_bytes(bytes: [u8; SCHLUESSEL_LAENGE]) -> Self {
        Self(bytes)
    }

    /// Erstellt einen Schluessel aus einem Slice, prueft die Laenge
    pub fn aus_slice(bytes: &[u8]) -> ProtokollResult<Self> {
        let array: [u8; SCHLUESSEL_LAENGE] =
            bytes
                .try_into()
                .map_err(|_| ProtokollFehler::SchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.0
    }
}

impl std::fmt::Debug for TransportSchluessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransportSchluessel([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Null-Padding
// ---------------------------------------------------------------------------

/// Fuellt mit NUL-Bytes auf die naechste Blockgrenze auf
///
/// Bereits ausgerichtete Daten bleiben unveraendert.
pub fn null_auffuellen(mut daten: Vec<u8>) -> Vec<u8> {
    let rest = daten.len() % BLOCK_GROESSE;
    if rest != 0 {
        daten.resize(daten.len() + BLOCK_GROESSE - rest, 0);
    }
    daten
}

/// Entfernt alle NUL-Bytes am Ende
pub fn null_entfernen(daten: &[u8]) -> &[u8] {
    let ende = daten.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &daten[..ende]
}

// ---------------------------------------------------------------------------
// Verschluesseln / Entschluesseln
// ---------------------------------------------------------------------------

/// Serialisiert eine Nachricht als JSON und verschluesselt sie
///
/// Jeder Aufruf verwendet einen frischen Zufalls-IV.
pub fn verschluesseln<T>(nachricht: &T, schluessel: &TransportSchluessel) -> ProtokollResult<String>
where
    T: Serialize + ?Sized,
{
    let mut iv = [0u8; BLOCK_GROESSE];
    OsRng.fill_bytes(&mut iv);
    verschluesseln_mit_iv(nachricht, schluessel, &iv)
}

fn verschluesseln_mit_iv<T>(
    nachricht: &T,
    schluessel: &TransportSchluessel,
    iv: &[u8; BLOCK_GROESSE],
) -> ProtokollResult<String>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec(nachricht)?;
    let mut puffer = null_auffuellen(json);
    let laenge = puffer.len();

    let cipher = Aes256CbcEnc::new_from_slices(schluessel.as_bytes(), iv)
        .map_err(|e| ProtokollFehler::Chiffre(e.to_string()))?;
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut puffer, laenge)
        .map_err(|e| ProtokollFehler::Chiffre(e.to_string()))?;

    Ok(format!(
        "{}{}{}",
        STANDARD.encode(iv),
        TRENNER,
        STANDARD.encode(&puffer)
    ))
}

/// Entschluesselt einen Umschlag-Frame und parst das JSON
///
/// Teilt am ersten `|`. Fehler (Base64, Blocklaenge, JSON) werden als
/// `ProtokollFehler` zurueckgegeben; der Aufrufer verwirft den Frame.
pub fn entschluesseln(
    frame: &str,
    schluessel: &TransportSchluessel,
) -> ProtokollResult<serde_json::Value> {
    let (iv_teil, chiffre_teil) = frame
        .split_once(TRENNER)
        .ok_or_else(|| ProtokollFehler::format("Trennzeichen fehlt"))?;

    let iv = STANDARD.decode(iv_teil)?;
    let mut puffer = STANDARD.decode(chiffre_teil)?;

    let cipher = Aes256CbcDec::new_from_slices(schluessel.as_bytes(), &iv)
        .map_err(|e| ProtokollFehler::Chiffre(e.to_string()))?;
    let klartext = cipher
        .decrypt_padded_mut::<NoPadding>(&mut puffer)
        .map_err(|e| ProtokollFehler::Chiffre(e.to_string()))?;

    Ok(serde_json::from_slice(null_entfernen(klartext))?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
