//! Persistenz und Rotation der Server-Identitaet
//!
//! `IdentitaetsSpeicher` abstrahiert den Ablageort des Schluesselpaars:
//! fluechtig im Speicher oder als JSON-Datei. `IdentitaetsVerwalter` laedt
//! die Identitaet bei Bedarf und rotiert sie nach `max_alter`, aber nur wenn
//! keine Verbindung mehr besteht.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::CryptoResult;
use crate::identity::ServerIdentitaet;

// ---------------------------------------------------------------------------
// Gespeicherte Form
// ---------------------------------------------------------------------------

/// Serialisierte Identitaet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GespeicherteIdentitaet {
    /// Base64 des PKCS#8-DER privaten Schluessels
    pub privat_pkcs8: String,
    pub erstellt_am: DateTime<Utc>,
}

impl GespeicherteIdentitaet {
    pub fn aus_identitaet(identitaet: &ServerIdentitaet) -> CryptoResult<Self> {
        Ok(Self {
            privat_pkcs8: STANDARD.encode(identitaet.pkcs8_der()?),
            erstellt_am: identitaet.erstellt_am(),
        })
    }

    pub fn zu_identitaet(&self) -> CryptoResult<ServerIdentitaet> {
        let der = STANDARD.decode(&self.privat_pkcs8)?;
        ServerIdentitaet::aus_pkcs8_der(&der, self.erstellt_am)
    }
}

// ---------------------------------------------------------------------------
// Speicher-Trait
// ---------------------------------------------------------------------------

/// Ablageort fuer die Server-Identitaet
pub trait IdentitaetsSpeicher: Send + Sync {
    fn laden(&self) -> CryptoResult<Option<GespeicherteIdentitaet>>;
    /// Ersetzt eine vorhandene Identitaet; schlaegt es fehl, bleibt die alte erhalten
    fn speichern(&self, identitaet: &GespeicherteIdentitaet) -> CryptoResult<()>;
}

/// Nur im Prozess gehaltene Identitaet, geht beim Neustart verloren
#[derive(Debug, Default)]
pub struct FluechtigerSpeicher {
    inhalt: Mutex<Option<GespeicherteIdentitaet>>,
}

impl FluechtigerSpeicher {
    pub fn neu() -> Self {
        Self::default()
    }
}

impl IdentitaetsSpeicher for FluechtigerSpeicher {
    fn laden(&self) -> CryptoResult<Option<GespeicherteIdentitaet>> {
        Ok(self.inhalt.lock().clone())
    }

    fn speichern(&self, identitaet: &GespeicherteIdentitaet) -> CryptoResult<()> {
        *self.inhalt.lock() = Some(identitaet.clone());
        Ok(())
    }
}

/// JSON-Datei auf der Platte
#[derive(Debug, Clone)]
pub struct DateiSpeicher {
    pfad: PathBuf,
}

impl DateiSpeicher {
    pub fn neu(pfad: impl Into<PathBuf>) -> Self {
        Self { pfad: pfad.into() }
    }

    pub fn pfad(&self) -> &Path {
        &self.pfad
    }
}

impl IdentitaetsSpeicher for DateiSpeicher {
    fn laden(&self) -> CryptoResult<Option<GespeicherteIdentitaet>> {
        match std::fs::read_to_string(&self.pfad) {
            Ok(inhalt) => Ok(Some(serde_json::from_str(&inhalt)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn speichern(&self, identitaet: &GespeicherteIdentitaet) -> CryptoResult<()> {
        if let Some(verzeichnis) = self.pfad.parent() {
            if !verzeichnis.as_os_str().is_empty() {
                std::fs::create_dir_all(verzeichnis)?;
            }
        }
        // Erst temporaer schreiben, dann umbenennen: kein halber Schluessel
        let temp = self.pfad.with_extension("tmp");
        std::fs::write(&temp, serde_json::to_vec_pretty(identitaet)?)?;
        std::fs::rename(&temp, &self.pfad)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IdentitaetsVerwalter
// ---------------------------------------------------------------------------

/// Ergebnis einer Rotationspruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationsErgebnis {
    /// Identitaet ist noch jung genug oder es gibt kein Hoechstalter
    NichtFaellig,
    /// Neue Identitaet erzeugt
    Rotiert,
    /// Faellig, aber Verbindungen aktiv; wird spaeter nachgeholt
    Vorgemerkt,
}

/// Haelt die aktuelle Server-Identitaet und rotiert sie bei Bedarf
pub struct IdentitaetsVerwalter {
    aktuell: RwLock<Option<Arc<ServerIdentitaet>>>,
    /// Serialisiert Laden und Rotation
    erzeugung: Mutex<()>,
    speicher: Arc<dyn IdentitaetsSpeicher>,
    rsa_bits: usize,
    max_alter: Option<chrono::Duration>,
    rotation_ausstehend: AtomicBool,
}

impl IdentitaetsVerwalter {
    pub fn neu(
        speicher: Arc<dyn IdentitaetsSpeicher>,
        rsa_bits: usize,
        max_alter: Option<chrono::Duration>,
    ) -> Self {
        Self {
            aktuell: RwLock::new(None),
            erzeugung: Mutex::new(()),
            speicher,
            rsa_bits,
            max_alter,
            rotation_ausstehend: AtomicBool::new(false),
        }
    }

    /// Liefert die aktuelle Identitaet, laedt oder erzeugt sie beim ersten Aufruf
    ///
    /// Parallele Aufrufer warten auf dieselbe Erzeugung.
    pub fn laden_oder_erzeugen(&self) -> CryptoResult<Arc<ServerIdentitaet>> {
        if let Some(identitaet) = self.aktuell.read().as_ref() {
            return Ok(Arc::clone(identitaet));
        }

        let _erzeugung = self.erzeugung.lock();
        if let Some(identitaet) = self.aktuell.read().as_ref() {
            return Ok(Arc::clone(identitaet));
        }

        let identitaet = match self.speicher.laden()? {
            Some(gespeichert) => {
                let identitaet = gespeichert.zu_identitaet()?;
                tracing::info!(
                    erstellt_am = %identitaet.erstellt_am(),
                    "Server-Identitaet geladen"
                );
                identitaet
            }
            None => self.neu_erzeugen()?,
        };

        let identitaet = Arc::new(identitaet);
        *self.aktuell.write() = Some(Arc::clone(&identitaet));
        Ok(identitaet)
    }

    fn neu_erzeugen(&self) -> CryptoResult<ServerIdentitaet> {
        let identitaet = ServerIdentitaet::generieren(self.rsa_bits)?;
        self.speicher
            .speichern(&GespeicherteIdentitaet::aus_identitaet(&identitaet)?)?;
        tracing::info!(bits = self.rsa_bits, "Neue Server-Identitaet erzeugt");
        Ok(identitaet)
    }

    /// Ob die Identitaet aelter als `max_alter` ist
    pub fn rotation_faellig(&self) -> bool {
        let Some(max_alter) = self.max_alter else {
            return false;
        };
        self.aktuell
            .read()
            .as_ref()
            .is_some_and(|identitaet| identitaet.alter(Utc::now()) > max_alter)
    }

    pub fn rotation_ausstehend(&self) -> bool {
        self.rotation_ausstehend.load(Ordering::Acquire)
    }

    /// Rotiert wenn faellig und keine Verbindung aktiv ist
    ///
    /// Sind noch Verbindungen aktiv, wird die Rotation vorgemerkt und beim
    /// naechsten Aufruf mit `aktive == 0` ausgefuehrt.
    pub fn rotieren_wenn_leerlauf(&self, aktive: usize) -> CryptoResult<RotationsErgebnis> {
        if !self.rotation_faellig() && !self.rotation_ausstehend() {
            return Ok(RotationsErgebnis::NichtFaellig);
        }
        if aktive > 0 {
            if !self.rotation_ausstehend.swap(true, Ordering::AcqRel) {
                tracing::info!(aktive, "Rotation der Server-Identitaet vorgemerkt");
            }
            return Ok(RotationsErgebnis::Vorgemerkt);
        }
        self.rotieren()?;
        Ok(RotationsErgebnis::Rotiert)
    }

    /// Ersetzt die Identitaet sofort
    ///
    /// Bestehende Verbindungen behalten ihren `Arc` auf die alte Identitaet.
    /// Scheitert Erzeugung oder Speichern, bleibt die alte Identitaet im
    /// Speicher und in Gebrauch.
    pub fn rotieren(&self) -> CryptoResult<()> {
        let _erzeugung = self.erzeugung.lock();
        let identitaet = Arc::new(self.neu_erzeugen()?);
        *self.aktuell.write() = Some(identitaet);
        self.rotation_ausstehend.store(false, Ordering::Release);
        tracing::info!("Server-Identitaet rotiert");
        Ok(())
    }
}

impl std::fmt::Debug for IdentitaetsVerwalter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitaetsVerwalter")
            .field("rsa_bits", &self.rsa_bits)
            .field("max_alter", &self.max_alter)
            .field("rotation_ausstehend", &self.rotation_ausstehend())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
