//! Integration-Tests fuer den Relay ueber echte WebSocket-Verbindungen

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hinterzimmer_crypto::{
    ClientHandshake, FluechtigerSpeicher, GespeicherteIdentitaet, IdentitaetsSpeicher,
    IdentitaetsVerwalter, ServerIdentitaet,
};
use hinterzimmer_protocol::{
    entschluesseln, verschluesseln, HandshakeAntwort, ServerKeyNachricht, TransportSchluessel,
};
use hinterzimmer_signaling::{
    BanStore, KeinBeobachter, SignalingConfig, SignalingServer, SignalingState, SpeicherBanStore,
};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARTEZEIT: Duration = Duration::from_secs(5);

fn gespeicherte_identitaet() -> GespeicherteIdentitaet {
    static IDENTITAET: OnceLock<GespeicherteIdentitaet> = OnceLock::new();
    IDENTITAET
        .get_or_init(|| {
            let identitaet = ServerIdentitaet::generieren(1024).unwrap();
            GespeicherteIdentitaet::aus_identitaet(&identitaet).unwrap()
        })
        .clone()
}

struct Relay {
    addr: SocketAddr,
    state: Arc<SignalingState>,
    _shutdown: watch::Sender<bool>,
}

async fn relay_starten(config: SignalingConfig) -> Relay {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let speicher = Arc::new(FluechtigerSpeicher::neu());
    speicher.speichern(&gespeicherte_identitaet()).unwrap();
    let verwalter = Arc::new(IdentitaetsVerwalter::neu(speicher, 1024, None));
    let state = SignalingState::neu(
        config,
        verwalter,
        Arc::new(SpeicherBanStore::neu()),
        Arc::new(KeinBeobachter),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = SignalingServer::neu(Arc::clone(&state), addr);
    tokio::spawn(server.starten_mit_listener(listener, shutdown_rx));

    Relay {
        addr,
        state,
        _shutdown: shutdown_tx,
    }
}

/// Naechster Text-Frame, `None` wenn die Verbindung endet
async fn naechster_text(ws: &mut Ws) -> Option<String> {
    loop {
        match tokio::time::timeout(WARTEZEIT, ws.next()).await.expect("Zeitueberschreitung") {
            Some(Ok(Message::Text(text))) => return Some(text),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

struct TestClient {
    ws: Ws,
    schluessel: TransportSchluessel,
}

impl TestClient {
    async fn roh(addr: SocketAddr, quelle: Option<&str>) -> Ws {
        let mut anfrage = format!("ws://{addr}/").into_client_request().unwrap();
        if let Some(quelle) = quelle {
            anfrage
                .headers_mut()
                .insert("x-forwarded-for", quelle.parse().unwrap());
        }
        let (ws, _) = connect_async(anfrage).await.unwrap();
        ws
    }

    async fn verbinden(addr: SocketAddr, quelle: Option<&str>) -> Self {
        let mut ws = Self::roh(addr, quelle).await;
        let server_key: ServerKeyNachricht =
            serde_json::from_str(&naechster_text(&mut ws).await.unwrap()).unwrap();

        let handshake = ClientHandshake::neu();
        ws.send(Message::Text(handshake.oeffentlich_hex().to_string()))
            .await
            .unwrap();
        let antwort = HandshakeAntwort::parsen(&naechster_text(&mut ws).await.unwrap()).unwrap();
        let schluessel = handshake.abschliessen(&antwort, &server_key.key).unwrap();

        Self { ws, schluessel }
    }

    async fn senden(&mut self, wert: Value) {
        let frame = verschluesseln(&wert, &self.schluessel).unwrap();
        self.ws.send(Message::Text(frame)).await.unwrap();
    }

    async fn empfangen(&mut self) -> Value {
        let frame = naechster_text(&mut self.ws).await.expect("Verbindung beendet");
        entschluesseln(&frame, &self.schluessel).unwrap()
    }

    /// Tritt bei und gibt die erste empfangene Mitgliederliste zurueck
    async fn beitreten(&mut self, channel: &str) -> Vec<String> {
        self.senden(json!({"a": "j", "p": channel})).await;
        let liste = self.empfangen().await;
        assert_eq!(liste["a"], "l");
        serde_json::from_value(liste["p"].clone()).unwrap()
    }
}

#[tokio::test]
async fn ping_vor_und_nach_handshake() {
    let relay = relay_starten(SignalingConfig::default()).await;

    let mut ws = TestClient::roh(relay.addr, None).await;
    let erster = naechster_text(&mut ws).await.unwrap();
    assert!(erster.starts_with(r#"{"type":"server-key""#));
    ws.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(naechster_text(&mut ws).await.unwrap(), "pong");

    let mut client = TestClient::verbinden(relay.addr, None).await;
    client.ws.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(naechster_text(&mut client.ws).await.unwrap(), "pong");
}

#[tokio::test]
async fn zwei_clients_tauschen_nachrichten() {
    let relay = relay_starten(SignalingConfig::default()).await;
    let mut a = TestClient::verbinden(relay.addr, None).await;
    let mut b = TestClient::verbinden(relay.addr, None).await;

    assert!(a.beitreten("room1").await.is_empty());
    let andere_fuer_b = b.beitreten("room1").await;
    assert_eq!(andere_fuer_b.len(), 1);
    let a_id = andere_fuer_b[0].clone();

    let liste = a.empfangen().await;
    let b_id = liste["p"][0].as_str().unwrap().to_string();
    assert_ne!(a_id, b_id);

    a.senden(json!({"a": "c", "p": "HELLO", "c": b_id})).await;
    assert_eq!(b.empfangen().await, json!({"a": "c", "p": "HELLO", "c": a_id}));

    let mut payloads = serde_json::Map::new();
    payloads.insert(a_id.clone(), json!("X"));
    payloads.insert("fremd".into(), json!("Y"));
    b.senden(json!({"a": "w", "p": payloads})).await;
    assert_eq!(a.empfangen().await, json!({"a": "c", "p": "X", "c": b_id}));

    // Verlassen aktualisiert die Liste der Verbliebenen
    b.ws.close(None).await.unwrap();
    assert_eq!(a.empfangen().await, json!({"a": "l", "p": []}));
    assert_eq!(relay.state.verbindungen_anzahl(), 1);
}

#[tokio::test]
async fn gesperrte_adresse_wird_abgewiesen() {
    let relay = relay_starten(SignalingConfig::default()).await;
    relay.state.bans.bannen("198.51.100.9", 0, "");

    let mut ws = TestClient::roh(relay.addr, Some("198.51.100.9")).await;
    assert!(naechster_text(&mut ws).await.is_none());
    assert_eq!(relay.state.verbindungen_anzahl(), 0);
}

#[tokio::test]
async fn ban_trennt_alle_verbindungen_der_adresse() {
    let relay = relay_starten(SignalingConfig {
        moderation_aktiviert: true,
        ban_trennung_verzoegerung: Duration::from_millis(100),
        ..SignalingConfig::default()
    })
    .await;
    let mut moderator = TestClient::verbinden(relay.addr, Some("10.0.0.1")).await;
    assert!(moderator.beitreten("room1").await.is_empty());
    let mut ziel = TestClient::verbinden(relay.addr, Some("10.0.0.2")).await;
    ziel.beitreten("room1").await;
    let ziel_id = moderator.empfangen().await["p"][0].as_str().unwrap().to_string();

    moderator
        .senden(json!({"a": "ban_ip", "t": ziel_id, "d": 5, "r": "spam"}))
        .await;

    assert_eq!(
        ziel.empfangen().await,
        json!({"a": "banned", "d": {"duration": 5, "reason": "spam"}})
    );
    assert_eq!(
        moderator.empfangen().await,
        json!({"a": "ban_result", "s": true, "ip": "10.0.0.2"})
    );
    assert!(naechster_text(&mut ziel.ws).await.is_none());
    assert_eq!(moderator.empfangen().await, json!({"a": "l", "p": []}));

    // Neue Verbindungen von der Adresse kommen nicht mehr durch
    let mut erneut = TestClient::roh(relay.addr, Some("10.0.0.2")).await;
    assert!(naechster_text(&mut erneut).await.is_none());
}

