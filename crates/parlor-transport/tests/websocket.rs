//! Integration tests for the WebSocket connection.
//!
//! These accept on a real TCP listener and dial it with [`connect`], so
//! both ends are [`WebSocketConnection`]s.

#[cfg(feature = "websocket")]
mod websocket {
    use parlor_transport::{Connection, WebSocketConnection, connect};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Listens on an ephemeral port and upgrades the first connection.
    async fn listen() -> (String, JoinHandle<WebSocketConnection<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("bound address");
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("should accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("should upgrade");
            WebSocketConnection::from_stream(ws)
        });
        (format!("ws://{addr}"), accept)
    }

    #[tokio::test]
    async fn test_websocket_frames_flow_both_ways() {
        let (url, server_handle) = listen().await;

        let client = connect(&url).await.expect("client should connect");
        let server = server_handle.await.expect("task should complete");

        assert_ne!(client.id(), server.id());

        server.send(b"<from server>").await.expect("send");
        let got = client.recv().await.expect("recv").expect("frame");
        assert_eq!(got, b"<from server>");

        client.send(b"<from client>").await.expect("send");
        let got = server.recv().await.expect("recv").expect("frame");
        assert_eq!(got, b"<from client>");

        server.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_peer_close() {
        let (url, server_handle) = listen().await;

        let client = connect(&url).await.unwrap();
        let server = server_handle.await.unwrap();

        client.close().await.unwrap();

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on peer close");
    }

    #[tokio::test]
    async fn test_send_while_recv_is_parked() {
        // A blocked recv must not hold the write half.
        let (url, server_handle) = listen().await;

        let client = std::sync::Arc::new(connect(&url).await.unwrap());
        let server = server_handle.await.unwrap();

        let reader = std::sync::Arc::clone(&client);
        let parked = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;

        client.send(b"ping").await.expect("send during recv");
        assert_eq!(server.recv().await.unwrap().unwrap(), b"ping");

        server.send(b"pong").await.unwrap();
        let echoed = parked.await.unwrap().unwrap().unwrap();
        assert_eq!(echoed, b"pong");
    }
}
