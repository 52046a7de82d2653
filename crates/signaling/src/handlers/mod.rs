//! Handler fuer die Aktionen aus entschluesselten Umschlaegen
//!
//! Jeder Handler ist fuer eine Gruppe von Aktionen zustaendig, nimmt die
//! Tabellen-Sperre selbst und haelt sie nie ueber ein `.await`.

pub mod channel_handler;
pub mod message_handler;
pub mod moderation_handler;
