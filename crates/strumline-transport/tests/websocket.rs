//! WebSocket transport against a real `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use strumline_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a listener, connects one client (optionally sending an
    /// `X-Forwarded-For` header) and returns both ends.
    async fn pair(trust_forwarded: bool, forwarded: Option<&str>) -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind")
            .trust_forwarded_for(trust_forwarded);
        let addr = transport.local_addr().expect("bound");
        let accepted = tokio::spawn(async move { transport.accept().await });

        let mut request = format!("ws://{addr}")
            .into_client_request()
            .expect("valid request");
        if let Some(value) = forwarded {
            request
                .headers_mut()
                .insert("x-forwarded-for", value.parse().expect("header"));
        }
        let (client, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("client should connect");
        let server = accepted
            .await
            .expect("accept task")
            .expect("should accept");
        (server, client)
    }

    #[tokio::test]
    async fn test_binary_frames_flow_both_ways() {
        let (server, mut client) = pair(false, None).await;
        assert!(server.id().into_inner() > 0);

        server.send(b"{\"seq\":0}").await.unwrap();
        let frame = client.next().await.unwrap().unwrap();
        assert_eq!(frame.into_data().as_ref(), b"{\"seq\":0}");

        client
            .send(Message::Binary(b"{\"seq\":1}".to_vec().into()))
            .await
            .unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), b"{\"seq\":1}");
    }

    #[tokio::test]
    async fn test_text_frames_arrive_as_bytes() {
        let (server, mut client) = pair(false, None).await;
        client
            .send(Message::Text("{\"name\":\"chat\"}".into()))
            .await
            .unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), b"{\"name\":\"chat\"}");
    }

    #[tokio::test]
    async fn test_recv_is_none_after_client_close() {
        let (server, mut client) = pair(false, None).await;
        client.send(Message::Close(None)).await.unwrap();
        assert!(server.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_not_blocked_by_pending_recv() {
        let (server, mut client) = pair(false, None).await;
        let server = Arc::new(server);

        let reader = Arc::clone(&server);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server.send(b"ping"))
            .await
            .expect("send must not wait on recv")
            .unwrap();
        let frame = client.next().await.unwrap().unwrap();
        assert_eq!(frame.into_data().as_ref(), b"ping");

        client.send(Message::Close(None)).await.unwrap();
        assert!(pending.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forwarded_header_ignored_by_default() {
        let (server, _client) = pair(false, Some("203.0.113.9")).await;
        assert_eq!(server.client_ip(), IpAddr::from([127, 0, 0, 1]));
    }

    #[tokio::test]
    async fn test_forwarded_header_used_when_trusted() {
        let (server, _client) = pair(true, Some("203.0.113.9, 10.0.0.1")).await;
        assert_eq!(server.client_ip(), IpAddr::from([203, 0, 113, 9]));
    }

    #[tokio::test]
    async fn test_garbage_forwarded_header_falls_back_to_peer() {
        let (server, _client) = pair(true, Some("unknown")).await;
        assert_eq!(server.client_ip(), IpAddr::from([127, 0, 0, 1]));
    }

    #[tokio::test]
    async fn test_close_with_delivers_application_code() {
        let (server, mut client) = pair(false, None).await;
        server.close_with(4102, "timed out").await.unwrap();
        match client.next().await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4102);
                assert_eq!(frame.reason.as_str(), "timed out");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}
