//! # hinterzimmer-crypto
//!
//! Server-Identitaet und Schluesselaustausch fuer Hinterzimmer.
//!
//! ## Module
//! - `identity` - RSA-Langzeitschluessel des Servers
//! - `key_exchange` - Signierter P-384 ECDH-Handshake (Server- und Client-Seite)
//! - `store` - Persistenz und Rotation der Identitaet
//! - `error` - Fehlertypen

pub mod error;
pub mod identity;
pub mod key_exchange;
pub mod store;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use identity::{signatur_pruefen, ServerIdentitaet, STANDARD_RSA_BITS};
pub use key_exchange::{handshake_durchfuehren, ClientHandshake};
pub use store::{
    DateiSpeicher, FluechtigerSpeicher, GespeicherteIdentitaet, IdentitaetsSpeicher,
    IdentitaetsVerwalter, RotationsErgebnis,
};
