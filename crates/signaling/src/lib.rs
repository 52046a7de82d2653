//! hinterzimmer-signaling – WebSocket-Relay
//!
//! Dieser Crate implementiert den Relay fuer Hinterzimmer. Er nimmt
//! WebSocket-Verbindungen an, fuehrt pro Verbindung den Schluesselaustausch
//! durch, verwaltet Channel-Mitgliedschaften und leitet verschluesselte
//! Nutzlasten zwischen Mitgliedern desselben Channels weiter, ohne sie
//! selbst lesen zu koennen.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket-Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Zustand: Verbunden -> Gesichert -> ImChannel
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- ChannelHandler     (j)
//!     +-- MessageHandler     (c, w)
//!     +-- ModerationHandler  (ban_ip, unban_ip)
//!
//! RelayTabellen – Verbindungen und Channels hinter einer Sperre
//! Sweeper       – trennt stille Verbindungen, raeumt Sperren auf
//! ```

pub mod bans;
pub mod beobachter;
pub mod broadcast;
pub mod channels;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod server_state;
pub mod sweeper;
pub mod ws;

// Bequeme Re-Exporte
pub use bans::{BanStore, SpeicherBanStore};
pub use beobachter::{HandshakeErgebnis, KeinBeobachter, RelayBeobachter};
pub use connection::{ClientConnection, FrameFolge};
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use server_state::{SignalingConfig, SignalingState};
pub use ws::{quelle_ermitteln, SignalingServer};
