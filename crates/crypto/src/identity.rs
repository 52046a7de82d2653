//! Langzeit-Identitaet des Servers (RSA)
//!
//! Der Server besitzt ein RSA-Schluesselpaar. Der oeffentliche Schluessel
//! wird jedem Client beim Verbindungsaufbau geschickt, der private signiert
//! die ephemeren ECDH-Schluessel des Handshakes (PKCS#1 v1.5, SHA-256).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Standard-Schluessellaenge in Bits
pub const STANDARD_RSA_BITS: usize = 2048;

/// RSA-Identitaet des Servers
pub struct ServerIdentitaet {
    privat: RsaPrivateKey,
    signierer: SigningKey<Sha256>,
    oeffentlich_base64: String,
    erstellt_am: DateTime<Utc>,
}

impl ServerIdentitaet {
    /// Generiert ein neues Schluesselpaar
    pub fn generieren(bits: usize) -> CryptoResult<Self> {
        let privat = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;
        Self::aus_schluessel(privat, Utc::now())
    }

    /// Stellt eine Identitaet aus PKCS#8-DER wieder her
    pub fn aus_pkcs8_der(der: &[u8], erstellt_am: DateTime<Utc>) -> CryptoResult<Self> {
        let privat = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::Kodierung(e.to_string()))?;
        Self::aus_schluessel(privat, erstellt_am)
    }

    fn aus_schluessel(privat: RsaPrivateKey, erstellt_am: DateTime<Utc>) -> CryptoResult<Self> {
        let oeffentlich_der = privat
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::Kodierung(e.to_string()))?;
        Ok(Self {
            signierer: SigningKey::<Sha256>::new(privat.clone()),
            oeffentlich_base64: STANDARD.encode(oeffentlich_der.as_bytes()),
            privat,
            erstellt_am,
        })
    }

    /// Privater Schluessel als PKCS#8-DER (fuer Persistenz)
    pub fn pkcs8_der(&self) -> CryptoResult<Vec<u8>> {
        let dokument = self
            .privat
            .to_pkcs8_der()
            .map_err(|e| CryptoError::Kodierung(e.to_string()))?;
        Ok(dokument.as_bytes().to_vec())
    }

    /// Base64 des DER-kodierten SubjectPublicKeyInfo, wie es der Client erhaelt
    pub fn oeffentlich_base64(&self) -> &str {
        &self.oeffentlich_base64
    }

    pub fn erstellt_am(&self) -> DateTime<Utc> {
        self.erstellt_am
    }

    /// Alter der Identitaet relativ zu `jetzt`
    pub fn alter(&self, jetzt: DateTime<Utc>) -> chrono::Duration {
        jetzt - self.erstellt_am
    }

    /// Signiert Daten (PKCS#1 v1.5 ueber SHA-256)
    pub fn signieren(&self, daten: &[u8]) -> CryptoResult<Vec<u8>> {
        let signatur = self
            .signierer
            .try_sign(daten)
            .map_err(|e| CryptoError::Signierung(e.to_string()))?;
        Ok(signatur.to_vec())
    }
}

impl std::fmt::Debug for ServerIdentitaet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentitaet")
            .field("erstellt_am", &self.erstellt_am)
            .field("privat", &"[RSA PrivateKey]")
            .finish()
    }
}

/// Prueft eine Signatur gegen einen Base64-DER-SPKI-Schluessel
///
/// Gegenstueck zu [`ServerIdentitaet::signieren`], wie es ein Client ausfuehrt.
pub fn signatur_pruefen(
    oeffentlich_base64: &str,
    daten: &[u8],
    signatur: &[u8],
) -> CryptoResult<()> {
    let der = STANDARD.decode(oeffentlich_base64)?;
    let oeffentlich = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::Kodierung(e.to_string()))?;
    let pruefer = VerifyingKey::<Sha256>::new(oeffentlich);
    let signatur = Signature::try_from(signatur)
        .map_err(|e| CryptoError::SignaturVerifikation(e.to_string()))?;
    pruefer
        .verify(daten, &signatur)
        .map_err(|e| CryptoError::SignaturVerifikation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
