use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use snapfeed::baas::{realtime::Realtime, Baas};
use snapfeed::config::AppCfg;
use snapfeed::routes::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_app(cfg: AppCfg) -> (Baas, String) {
    let baas = Baas::new(&cfg.baas, Realtime::new(cfg.realtime.buffer));
    let app = snapfeed::app_with_state(AppState::new(baas.clone(), &cfg), &cfg.allowed_origins);
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (baas, format!("ws://{}:{}", addr.ip(), addr.port()))
}

async fn connect(base: &str, channel: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("{base}/realtime?channel={channel}"))
        .await
        .unwrap();
    ws
}

async fn wait_subscribed(baas: &Baas, channel: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while baas.realtime.subscriber_count(channel) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("websocket never subscribed");
}

async fn next_payload(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no frame within timeout")
        .expect("socket ended")
        .unwrap();
    match msg {
        WsMessage::Text(text) => {
            let event: Value = serde_json::from_str(&text).unwrap();
            event["payload"].clone()
        }
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn events_keep_flowing_after_a_disconnect() {
    let (baas, base) = start_app(AppCfg::default()).await;
    let channel = baas.databases.posts.channel().to_owned();
    let mut ws = connect(&base, &channel).await;
    wait_subscribed(&baas, &channel).await;

    baas.realtime.publish(&channel, vec![], json!({ "n": 1 }));
    assert_eq!(next_payload(&mut ws).await, json!({ "n": 1 }));

    assert_eq!(baas.realtime.disconnect(&channel), 1);
    wait_subscribed(&baas, &channel).await;

    baas.realtime.publish(&channel, vec![], json!({ "n": 2 }));
    assert_eq!(next_payload(&mut ws).await, json!({ "n": 2 }));

    ws.send(WsMessage::Close(None)).await.unwrap();
}

#[tokio::test]
async fn socket_closes_once_reconnects_run_out() {
    let mut cfg = AppCfg::default();
    cfg.realtime.max_attempts = 0;
    let (baas, base) = start_app(cfg).await;
    let channel = baas.databases.posts.channel().to_owned();
    let mut ws = connect(&base, &channel).await;
    wait_subscribed(&baas, &channel).await;

    baas.realtime.disconnect(&channel);

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("socket stayed open");
    assert!(
        matches!(frame, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))),
        "unexpected frame {frame:?}"
    );
}

#[tokio::test]
async fn unknown_channels_are_rejected() {
    let (_baas, base) = start_app(AppCfg::default()).await;
    let res = tokio_tungstenite::connect_async(format!("{base}/realtime?channel=nope")).await;
    assert!(res.is_err());
}
