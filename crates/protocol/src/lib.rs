//! hinterzimmer-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Frames die zwischen Client und Server
//! ausgetauscht werden: Klartext-Frames (Server-Key, Handshake, Keepalive)
//! und den verschluesselten Umschlag samt seinen Aktionen.

pub mod codec;
pub mod control;
pub mod error;
pub mod wire;

pub use codec::{entschluesseln, verschluesseln, TransportSchluessel};
pub use control::{BanDetails, ClientAktion, ServerNachricht, VerwurfGrund};
pub use error::{ProtokollFehler, ProtokollResult};
pub use wire::{FrameArt, FrameGrenzen, HandshakeAntwort, ServerKeyNachricht};
