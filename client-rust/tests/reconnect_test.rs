//! Reconnect behaviour against a scripted server that drops the first session.

use std::time::Duration;

use canvas_client::{CanvasClient, CanvasEvent};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

fn dot(x: f64) -> Value {
    json!({"id": null, "color": "black", "x": x, "y": x, "radius": 10.0, "startAngle": 0.0, "endAngle": 1.0})
}

fn init_reply(id: Uuid, color: &str, dots: &[Value]) -> Message {
    let state: Vec<Value> = dots
        .iter()
        .map(|d| json!({"type": "paint", "payload": d}))
        .collect();
    Message::Text(
        json!({"type": "init", "payload": {"id": id.to_string(), "color": color, "state": state}})
            .to_string(),
    )
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Wait for the client's init request.
async fn expect_init(ws: &mut WebSocketStream<TcpStream>) {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value, json!({"type": "init"}));
                return;
            }
            Some(Ok(_)) => continue,
            other => panic!("expected init request, got {other:?}"),
        }
    }
}

async fn next_event(client: &mut CanvasClient) -> CanvasEvent {
    tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("Expected an event within timeout")
        .expect("client stopped")
}

#[tokio::test]
async fn test_reconnect_rejoins_with_new_identity_and_full_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (first_id, second_id) = (Uuid::new_v4(), Uuid::new_v4());
    let (asked_tx, asked_rx) = oneshot::channel::<()>();
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        // First session: answer init, then drop the client.
        let mut ws = accept(&listener).await;
        expect_init(&mut ws).await;
        ws.send(init_reply(first_id, "#111111", &[dot(1.0)])).await.unwrap();
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}

        // Second session: hold the reply until the test has looked around.
        let mut ws = accept(&listener).await;
        expect_init(&mut ws).await;
        asked_tx.send(()).unwrap();
        go_rx.await.unwrap();
        ws.send(init_reply(second_id, "#222222", &[dot(1.0), dot(2.0)]))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut client = CanvasClient::connect(&format!("ws://{addr}/ws")).await;

    match next_event(&mut client).await {
        CanvasEvent::Joined { identity, state } => {
            assert_eq!(identity.id, first_id);
            assert_eq!(state.len(), 1);
        }
        other => panic!("expected Joined, got {other:?}"),
    }

    // Between sessions the old identity is gone.
    tokio::time::timeout(Duration::from_secs(5), asked_rx)
        .await
        .expect("client did not reconnect")
        .unwrap();
    assert_eq!(client.identity(), None);
    go_tx.send(()).unwrap();

    match next_event(&mut client).await {
        CanvasEvent::Joined { identity, state } => {
            assert_eq!(identity.id, second_id);
            assert_eq!(identity.color, "#222222");
            let xs: Vec<f64> = state.iter().map(|d| d.x).collect();
            assert_eq!(xs, vec![1.0, 2.0]);
        }
        other => panic!("expected Joined, got {other:?}"),
    }
    assert_eq!(client.identity().map(|i| i.id), Some(second_id));

    client.shutdown().await.unwrap();
    server.await.unwrap();
}
