//! Live-connection behavior of the transcription client, exercised
//! against a local WebSocket server standing in for the provider.

use dialhawk_voice::{SttConfig, SttEvent, SttState, StreamParams, TranscriberClient};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Starts a one-connection WebSocket server. The server records the
/// query string it was called with, answers every binary frame with a
/// canned `Results` message, and echoes keepalives back as `Metadata`
/// (which the client must drop).
async fn spawn_fake_provider() -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut query = String::new();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &tokio_tungstenite::tungstenite::handshake::server::Request, resp| {
                query = req.uri().query().unwrap_or_default().to_string();
                Ok(resp)
            },
        )
        .await
        .expect("handshake");

        let (mut tx, mut rx) = ws.split();
        while let Some(Ok(message)) = rx.next().await {
            match message {
                Message::Binary(_) => {
                    let results = r#"{
                        "type": "Results",
                        "is_final": true,
                        "speech_final": true,
                        "channel": {"alternatives": [{"transcript": "test utterance"}]}
                    }"#;
                    tx.send(Message::Text(results.into())).await.expect("send");
                }
                Message::Text(text) if text.contains("KeepAlive") => {
                    tx.send(Message::Text(r#"{"type":"Metadata"}"#.into()))
                        .await
                        .expect("send");
                }
                Message::Text(_) | Message::Close(_) => break,
                _ => {}
            }
        }
        query
    });

    (format!("ws://{}/v1/listen", addr), handle)
}

#[tokio::test]
async fn streams_audio_and_receives_final_transcript() {
    let (url, server) = spawn_fake_provider().await;
    let config = SttConfig {
        url,
        api_key: String::new(),
    };

    let (mut client, mut events) = TranscriberClient::start(&config, &StreamParams::telephony())
        .await
        .expect("connect should succeed");
    assert_eq!(client.state(), SttState::Open);

    client.send(&[0xFF; 160]).await.expect("send should succeed");
    assert_eq!(client.state(), SttState::Streaming);

    match events.recv().await {
        Some(SttEvent::Transcript(t)) => {
            assert_eq!(t.text, "test utterance");
            assert!(t.is_final);
            assert!(t.utterance_end);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Keepalive goes through; the Metadata echo is dropped, not delivered.
    client.keepalive().await.expect("keepalive should succeed");

    client.finish().await;

    let query = server.await.expect("server task");
    assert!(query.contains("encoding=mulaw"));
    assert!(query.contains("sample_rate=8000"));
    assert!(query.contains("utterance_end_ms=1000"));
}

#[tokio::test]
async fn browser_params_reach_the_provider() {
    let (url, server) = spawn_fake_provider().await;
    let config = SttConfig {
        url,
        api_key: String::new(),
    };

    let (mut client, _events) = TranscriberClient::start(&config, &StreamParams::browser())
        .await
        .expect("connect should succeed");
    client.send(&[0u8; 640]).await.expect("send should succeed");
    client.finish().await;

    let query = server.await.expect("server task");
    assert!(query.contains("encoding=linear16"));
    assert!(query.contains("sample_rate=16000"));
}
