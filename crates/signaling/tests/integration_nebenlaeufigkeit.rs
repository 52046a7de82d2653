//! Gleichzeitige Beitritte und Abgaenge in einem Channel

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use hinterzimmer_core::ChannelName;
use hinterzimmer_crypto::{
    ClientHandshake, FluechtigerSpeicher, GespeicherteIdentitaet, IdentitaetsSpeicher,
    IdentitaetsVerwalter, ServerIdentitaet,
};
use hinterzimmer_protocol::{
    entschluesseln, verschluesseln, HandshakeAntwort, ServerKeyNachricht, TransportSchluessel,
};
use hinterzimmer_signaling::broadcast::Postfach;
use hinterzimmer_signaling::{
    ClientConnection, KeinBeobachter, SignalingConfig, SignalingState, SpeicherBanStore,
};
use serde_json::json;
use tokio::sync::Barrier;

const BLEIBENDE: usize = 12;
const GEHENDE: usize = 12;

fn state() -> Arc<SignalingState> {
    static IDENTITAET: OnceLock<GespeicherteIdentitaet> = OnceLock::new();
    let gespeichert = IDENTITAET
        .get_or_init(|| {
            let identitaet = ServerIdentitaet::generieren(1024).unwrap();
            GespeicherteIdentitaet::aus_identitaet(&identitaet).unwrap()
        })
        .clone();
    let speicher = Arc::new(FluechtigerSpeicher::neu());
    speicher.speichern(&gespeichert).unwrap();

    SignalingState::neu(
        SignalingConfig::default(),
        Arc::new(IdentitaetsVerwalter::neu(speicher, 1024, None)),
        Arc::new(SpeicherBanStore::neu()),
        Arc::new(KeinBeobachter),
    )
}

/// Client-Seite einer gesicherten Verbindung
struct Gegenstelle {
    id: String,
    postfach: Postfach,
    schluessel: TransportSchluessel,
}

impl Gegenstelle {
    /// Alle bisher eingegangenen Mitgliederlisten, in Empfangsreihenfolge
    fn listen(&mut self) -> Vec<BTreeSet<String>> {
        let mut listen = Vec::new();
        while let Ok(frame) = self.postfach.empfaenger.try_recv() {
            let wert = entschluesseln(&frame, &self.schluessel).unwrap();
            assert_eq!(wert["a"], "l", "unerwarteter Frame {wert}");
            let ids: Vec<String> = serde_json::from_value(wert["p"].clone()).unwrap();
            listen.push(ids.into_iter().collect());
        }
        listen
    }
}

fn sichern(state: &Arc<SignalingState>) -> (ClientConnection, Gegenstelle) {
    let (verbindung, mut postfach) =
        ClientConnection::annehmen(Arc::clone(state), "10.0.0.1".into()).unwrap();
    let server_key: ServerKeyNachricht =
        serde_json::from_str(&postfach.empfaenger.try_recv().unwrap()).unwrap();

    let handshake = ClientHandshake::neu();
    verbindung.frame_verarbeiten(handshake.oeffentlich_hex());
    let antwort = HandshakeAntwort::parsen(&postfach.empfaenger.try_recv().unwrap()).unwrap();
    let schluessel = handshake.abschliessen(&antwort, &server_key.key).unwrap();

    let gegenstelle = Gegenstelle {
        id: verbindung.id().as_str().to_string(),
        postfach,
        schluessel,
    };
    (verbindung, gegenstelle)
}

fn beitreten(verbindung: &ClientConnection, schluessel: &TransportSchluessel) {
    let frame = verschluesseln(&json!({"a": "j", "p": "room1"}), schluessel).unwrap();
    verbindung.frame_verarbeiten(&frame);
}

/// Aufeinanderfolgende Listen unterscheiden sich um genau ein Mitglied
fn pruefe_folge(gegenstelle: &str, listen: &[BTreeSet<String>], alle: &BTreeSet<String>) {
    for liste in listen {
        assert!(!liste.contains(gegenstelle), "{gegenstelle} steht in der eigenen Liste");
        assert!(liste.is_subset(alle), "fremde ID in Liste {liste:?}");
    }
    for paar in listen.windows(2) {
        let unterschied: Vec<_> = paar[0].symmetric_difference(&paar[1]).collect();
        assert_eq!(
            unterschied.len(),
            1,
            "{gegenstelle}: Listen {:?} -> {:?} passen zu keinem einzelnen Schritt",
            paar[0],
            paar[1]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gleichzeitige_beitritte_und_abgaenge_bleiben_konsistent() {
    let state = state();
    let room1 = ChannelName::neu("room1").unwrap();

    let mut gegenstellen = Vec::new();
    let mut aufgaben = Vec::new();
    let barriere = Arc::new(Barrier::new(BLEIBENDE + GEHENDE));

    for i in 0..BLEIBENDE + GEHENDE {
        let (verbindung, gegenstelle) = sichern(&state);
        let schluessel = gegenstelle.schluessel.clone();
        let geht = i >= BLEIBENDE;
        let state = Arc::clone(&state);
        let barriere = Arc::clone(&barriere);
        gegenstellen.push((gegenstelle, geht));

        aufgaben.push(tokio::spawn(async move {
            barriere.wait().await;
            beitreten(&verbindung, &schluessel);
            if geht {
                tokio::task::yield_now().await;
                assert!(state.verbindung_entfernen(verbindung.id()));
            }
            verbindung
        }));
    }

    let mut verbindungen = Vec::new();
    for aufgabe in aufgaben {
        verbindungen.push(aufgabe.await.unwrap());
    }

    let alle: BTreeSet<String> = gegenstellen.iter().map(|(g, _)| g.id.clone()).collect();
    let bleibende: BTreeSet<String> = gegenstellen
        .iter()
        .filter(|(_, geht)| !geht)
        .map(|(g, _)| g.id.clone())
        .collect();

    let mitglieder: BTreeSet<String> = state
        .channel_mitglieder(&room1)
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    assert_eq!(mitglieder, bleibende);

    for (gegenstelle, geht) in &mut gegenstellen {
        let listen = gegenstelle.listen();
        assert!(!listen.is_empty(), "{} hat keine Liste bekommen", gegenstelle.id);
        pruefe_folge(&gegenstelle.id, &listen, &alle);

        if !*geht {
            // Die letzte Liste spiegelt den Endzustand
            let mut erwartet = bleibende.clone();
            erwartet.remove(&gegenstelle.id);
            assert_eq!(listen.last(), Some(&erwartet));
        }
    }

    // Nach dem Abgang erreicht keine Liste mehr die Gegangenen
    let (nachzuegler, mut neu) = sichern(&state);
    beitreten(&nachzuegler, &neu.schluessel);
    assert_eq!(neu.listen().last(), Some(&bleibende));

    for (gegenstelle, geht) in &mut gegenstellen {
        let listen = gegenstelle.listen();
        if *geht {
            assert!(listen.is_empty(), "{} bekam nach dem Abgang {listen:?}", gegenstelle.id);
        } else {
            let mut erwartet = bleibende.clone();
            erwartet.remove(&gegenstelle.id);
            erwartet.insert(neu.id.clone());
            assert_eq!(listen, vec![erwartet]);
        }
    }
    drop(verbindungen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nebenlaeufiges_entfernen_ist_idempotent() {
    let state = state();
    let (verbindung, mut gegenstelle) = sichern(&state);
    beitreten(&verbindung, &gegenstelle.schluessel);
    let (anderer, mut andere_stelle) = sichern(&state);
    beitreten(&anderer, &andere_stelle.schluessel);
    gegenstelle.listen();
    andere_stelle.listen();

    let id = verbindung.id().clone();
    let versuche: Vec<_> = (0..8)
        .map(|_| {
            let state = Arc::clone(&state);
            let id = id.clone();
            tokio::spawn(async move { state.verbindung_entfernen(&id) })
        })
        .collect();

    let mut erfolgreich = 0;
    for versuch in versuche {
        if versuch.await.unwrap() {
            erfolgreich += 1;
        }
    }
    assert_eq!(erfolgreich, 1);
    // Genau eine Abgangs-Liste fuer den Verbliebenen
    assert_eq!(andere_stelle.listen(), vec![BTreeSet::new()]);
}
