//! IP-Sperren
//!
//! Der Relay prueft beim Verbindungsaufbau, ob die Quelladresse gesperrt
//! ist, und legt bei `ban_ip` neue Sperren an. Wo die Sperren liegen, bestimmt
//! die `BanStore`-Implementierung; mitgeliefert wird ein In-Memory-Store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Ablage fuer IP-Sperren
pub trait BanStore: Send + Sync {
    /// Sperrt eine Adresse, `dauer_min == 0` bedeutet dauerhaft
    fn bannen(&self, ip: &str, dauer_min: u64, grund: &str);

    /// Hebt eine Sperre auf, `true` wenn eine bestand
    fn entbannen(&self, ip: &str) -> bool;

    /// Ob die Adresse aktuell gesperrt ist
    fn ist_gebannt(&self, ip: &str) -> bool;

    /// Entfernt abgelaufene Sperren, gibt die Anzahl zurueck
    fn aufraeumen(&self) -> usize {
        0
    }
}

/// Einzelne Sperre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEintrag {
    pub gebannt_am: DateTime<Utc>,
    /// `None` = dauerhaft
    pub gebannt_bis: Option<DateTime<Utc>>,
    pub grund: String,
}

impl BanEintrag {
    pub fn neu(jetzt: DateTime<Utc>, dauer_min: u64, grund: &str) -> Self {
        let gebannt_bis = (dauer_min > 0)
            .then(|| i64::try_from(dauer_min).ok())
            .flatten()
            .and_then(Duration::try_minutes)
            .and_then(|dauer| jetzt.checked_add_signed(dauer));
        Self {
            gebannt_am: jetzt,
            gebannt_bis,
            grund: grund.to_string(),
        }
    }

    pub fn ist_aktiv(&self, jetzt: DateTime<Utc>) -> bool {
        self.gebannt_bis.map_or(true, |bis| jetzt < bis)
    }
}

/// Sperren im Prozessspeicher
#[derive(Debug, Default)]
pub struct SpeicherBanStore {
    eintraege: DashMap<String, BanEintrag>,
}

impl SpeicherBanStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Wie `ist_gebannt`, aber zu einem festen Zeitpunkt
    ///
    /// Abgelaufene Eintraege werden dabei entfernt.
    pub fn ist_gebannt_zu(&self, ip: &str, jetzt: DateTime<Utc>) -> bool {
        let aktiv = match self.eintraege.get(ip) {
            Some(eintrag) => eintrag.ist_aktiv(jetzt),
            None => return false,
        };
        if !aktiv {
            self.eintraege.remove_if(ip, |_, eintrag| !eintrag.ist_aktiv(jetzt));
        }
        aktiv
    }

    pub fn eintrag(&self, ip: &str) -> Option<BanEintrag> {
        self.eintraege.get(ip).map(|e| e.clone())
    }

    pub fn anzahl(&self) -> usize {
        self.eintraege.len()
    }

    fn aufraeumen_zu(&self, jetzt: DateTime<Utc>) -> usize {
        let vorher = self.eintraege.len();
        self.eintraege.retain(|_, eintrag| eintrag.ist_aktiv(jetzt));
        vorher.saturating_sub(self.eintraege.len())
    }
}

impl BanStore for SpeicherBanStore {
    fn bannen(&self, ip: &str, dauer_min: u64, grund: &str) {
        self.eintraege
            .insert(ip.to_string(), BanEintrag::neu(Utc::now(), dauer_min, grund));
        tracing::info!(ip, dauer_min, grund, "IP gesperrt");
    }

    fn entbannen(&self, ip: &str) -> bool {
        let bestand = self.eintraege.remove(ip).is_some();
        tracing::info!(ip, bestand, "IP-Sperre aufgehoben");
        bestand
    }

    fn ist_gebannt(&self, ip: &str) -> bool {
        self.ist_gebannt_zu(ip, Utc::now())
    }

    fn aufraeumen(&self) -> usize {
        self.aufraeumen_zu(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dauerhafte_sperre() {
        let store = SpeicherBanStore::neu();
        store.bannen("10.0.0.1", 0, "spam");

        assert!(store.ist_gebannt("10.0.0.1"));
        assert!(!store.ist_gebannt("10.0.0.2"));
        let eintrag = store.eintrag("10.0.0.1").unwrap();
        assert!(eintrag.gebannt_bis.is_none());
        assert_eq!(eintrag.grund, "spam");
        // Auch in ferner Zukunft noch aktiv
        assert!(store.ist_gebannt_zu("10.0.0.1", Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn befristete_sperre_laeuft_ab() {
        let store = SpeicherBanStore::neu();
        store.bannen("10.0.0.1", 30, "");

        assert!(store.ist_gebannt_zu("10.0.0.1", Utc::now() + Duration::minutes(29)));
        assert!(!store.ist_gebannt_zu("10.0.0.1", Utc::now() + Duration::minutes(31)));
        // Abgelaufener Eintrag wurde beim Nachschlagen entfernt
        assert_eq!(store.anzahl(), 0);
    }

    #[test]
    fn entbannen() {
        let store = SpeicherBanStore::neu();
        store.bannen("10.0.0.1", 0, "");
        assert!(store.entbannen("10.0.0.1"));
        assert!(!store.ist_gebannt("10.0.0.1"));
        assert!(!store.entbannen("10.0.0.1"));
    }

    #[test]
    fn erneutes_bannen_ueberschreibt() {
        let store = SpeicherBanStore::neu();
        store.bannen("10.0.0.1", 5, "erst");
        store.bannen("10.0.0.1", 0, "dann");
        let eintrag = store.eintrag("10.0.0.1").unwrap();
        assert!(eintrag.gebannt_bis.is_none());
        assert_eq!(eintrag.grund, "dann");
    }

    #[test]
    fn aufraeumen_entfernt_nur_abgelaufene() {
        let store = SpeicherBanStore::neu();
        store.bannen("10.0.0.1", 1, "");
        store.bannen("10.0.0.2", 0, "");

        assert_eq!(store.aufraeumen_zu(Utc::now() + Duration::minutes(2)), 1);
        assert_eq!(store.anzahl(), 1);
        assert!(store.ist_gebannt("10.0.0.2"));
    }

    #[test]
    fn riesige_dauer_gilt_als_dauerhaft() {
        let eintrag = BanEintrag::neu(Utc::now(), u64::MAX, "");
        assert!(eintrag.gebannt_bis.is_none());
        assert!(eintrag.ist_aktiv(Utc::now()));
    }
}
