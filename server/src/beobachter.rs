//! Anbindung der Relay-Ereignisse an Prometheus

use hinterzimmer_observability::HinterzimmerMetrics;
use hinterzimmer_signaling::{HandshakeErgebnis, RelayBeobachter};

/// Schreibt Relay-Ereignisse in die Prometheus-Metriken
#[derive(Debug, Clone)]
pub struct MetrikBeobachter(HinterzimmerMetrics);

impl MetrikBeobachter {
    pub fn neu(metriken: HinterzimmerMetrics) -> Self {
        Self(metriken)
    }
}

impl RelayBeobachter for MetrikBeobachter {
    fn verbindungen_gesetzt(&self, anzahl: usize) {
        self.0.verbindungen.set(anzahl as f64);
    }

    fn channels_gesetzt(&self, anzahl: usize) {
        self.0.channels_aktiv.set(anzahl as f64);
    }

    fn handshake(&self, ergebnis: HandshakeErgebnis) {
        self.0
            .handshakes_total
            .with_label_values(&[ergebnis.label()])
            .inc();
    }

    fn weitergeleitet(&self, anzahl: usize) {
        self.0.frames_weitergeleitet_total.inc_by(anzahl as f64);
    }

    fn verworfen(&self, grund: &'static str) {
        self.0.frames_verworfen_total.with_label_values(&[grund]).inc();
    }

    fn verdraengt(&self, anzahl: usize) {
        self.0.verbindungen_verdraengt_total.inc_by(anzahl as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ereignisse_landen_in_metriken() {
        let metriken = HinterzimmerMetrics::neu().unwrap();
        let beobachter = MetrikBeobachter::neu(metriken.clone());

        beobachter.verbindungen_gesetzt(4);
        beobachter.channels_gesetzt(2);
        beobachter.handshake(HandshakeErgebnis::Erfolg);
        beobachter.handshake(HandshakeErgebnis::Fehler);
        beobachter.weitergeleitet(3);
        beobachter.verworfen("zu_gross");
        beobachter.verdraengt(1);

        assert_eq!(metriken.verbindungen.get(), 4.0);
        assert_eq!(metriken.channels_aktiv.get(), 2.0);
        assert_eq!(
            metriken.handshakes_total.with_label_values(&["fehler"]).get(),
            1
        );
        assert_eq!(metriken.frames_weitergeleitet_total.get(), 3.0);
        assert_eq!(
            metriken
                .frames_verworfen_total
                .with_label_values(&["zu_gross"])
                .get(),
            1
        );
        assert_eq!(metriken.verbindungen_verdraengt_total.get(), 1.0);
    }
}
