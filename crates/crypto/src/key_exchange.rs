//! Signierter P-384 Schluesselaustausch
//!
//! Ablauf:
//! 1. Server schickt seinen RSA-Schluessel (`server-key`)
//! 2. Client schickt seinen P-384 Public Key (hex, SEC1 unkomprimiert)
//! 3. Server erzeugt einen ephemeren P-384 Schluessel, rechnet ECDH und
//!    antwortet mit `<hex pub>|<base64 RSA-Signatur ueber pub>`
//! 4. Beide Seiten nehmen die Bytes 8..40 des gemeinsamen Geheimnisses als
//!    AES-256 Transport-Schluessel
//!
//! Die Signatur bindet den ephemeren Schluessel an die Server-Identitaet und
//! verhindert einen Man-in-the-Middle, solange der Client den RSA-Schluessel
//! kennt.

use std::ops::Range;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p384::ecdh::EphemeralSecret;
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::PublicKey;
use rand::rngs::OsRng;

use hinterzimmer_protocol::{HandshakeAntwort, TransportSchluessel};

use crate::error::{CryptoError, CryptoResult};
use crate::identity::{signatur_pruefen, ServerIdentitaet};

/// Ausschnitt des ECDH-Geheimnisses, der als Transport-Schluessel dient
pub const TRANSPORT_SCHLUESSEL_BEREICH: Range<usize> = 8..40;

/// Server-Seite des Handshakes
///
/// Gibt den Transport-Schluessel und die an den Client zu sendende Antwort
/// zurueck. Jeder Fehler (kein Hex, kein Punkt auf der Kurve) bedeutet, dass
/// die Verbindung geschlossen werden muss.
pub fn handshake_durchfuehren(
    identitaet: &ServerIdentitaet,
    client_hex: &str,
) -> CryptoResult<(TransportSchluessel, HandshakeAntwort)> {
    let client_bytes = hex::decode(client_hex)?;
    let client_schluessel = PublicKey::from_sec1_bytes(&client_bytes)
        .map_err(|e| CryptoError::KeyExchange(format!("Client-Schluessel ungueltig: {e}")))?;

    let geheim = EphemeralSecret::random(&mut OsRng);
    let oeffentlich = geheim.public_key().to_encoded_point(false);
    let gemeinsam = geheim.diffie_hellman(&client_schluessel);
    let schluessel = transport_schluessel_ableiten(gemeinsam.raw_secret_bytes())?;

    let signatur = identitaet.signieren(oeffentlich.as_bytes())?;

    Ok((
        schluessel,
        HandshakeAntwort {
            oeffentlich_hex: hex::encode(oeffentlich.as_bytes()),
            signatur_base64: STANDARD.encode(signatur),
        },
    ))
}

fn transport_schluessel_ableiten(geheimnis: &[u8]) -> CryptoResult<TransportSchluessel> {
    let ausschnitt = geheimnis
        .get(TRANSPORT_SCHLUESSEL_BEREICH)
        .ok_or_else(|| CryptoError::KeyExchange("ECDH-Geheimnis zu kurz".into()))?;
    Ok(TransportSchluessel::aus_slice(ausschnitt)?)
}

// ---------------------------------------------------------------------------
// Client-Seite
// ---------------------------------------------------------------------------

/// Client-Seite des Handshakes
///
/// Wird von Tests und Werkzeugen genutzt, um den Transport-Schluessel
/// unabhaengig vom Server abzuleiten.
pub struct ClientHandshake {
    geheim: EphemeralSecret,
    oeffentlich_hex: String,
}

impl ClientHandshake {
    pub fn neu() -> Self {
        let geheim = EphemeralSecret::random(&mut OsRng);
        let oeffentlich_hex = hex::encode(geheim.public_key().to_encoded_point(false).as_bytes());
        Self {
            geheim,
            oeffentlich_hex,
        }
    }

    /// Der Frame, den der Client als Handshake schickt
    pub fn oeffentlich_hex(&self) -> &str {
        &self.oeffentlich_hex
    }

    /// Prueft die Server-Antwort und leitet den Transport-Schluessel ab
    pub fn abschliessen(
        self,
        antwort: &HandshakeAntwort,
        server_key_base64: &str,
    ) -> CryptoResult<TransportSchluessel> {
        let server_bytes = hex::decode(&antwort.oeffentlich_hex)?;
        let signatur = STANDARD.decode(&antwort.signatur_base64)?;
        signatur_pruefen(server_key_base64, &server_bytes, &signatur)?;

        let server_schluessel = PublicKey::from_sec1_bytes(&server_bytes)
            .map_err(|e| CryptoError::KeyExchange(format!("Server-Schluessel ungueltig: {e}")))?;
        let gemeinsam = self.geheim.diffie_hellman(&server_schluessel);
        transport_schluessel_ableiten(gemeinsam.raw_secret_bytes())
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::neu()
    }
}

impl std::fmt::Debug for ClientHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("oeffentlich_hex", &self.oeffentlich_hex)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
