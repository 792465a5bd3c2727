//! Integration tests for sessionwire.
//!
//! These tests run a real listener on 127.0.0.1 and drive it with clients
//! built through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionwire::codec::MsgPackCodec;
use sessionwire::config::ListenerSettings;
use sessionwire::handshake::HANDSHAKE_KIND;
use sessionwire::protocol::{build_frame, FrameBuffer, APPLICATION_PROTOCOL_BASE, HEADER_SIZE};
use sessionwire::{
    ClientBuilder, ConnectionConfig, Context, FnHandler, Handler, HandlerKind, Listener, ListenerConfig,
    Segment, ServerContext, Session, SessionObserver,
};

const CHAT: u16 = APPLICATION_PROTOCOL_BASE;
const CHAT_ECHO: u16 = APPLICATION_PROTOCOL_BASE + 1;
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    from: u64,
    text: String,
}

fn local() -> ListenerSettings {
    ListenerSettings {
        bind: "127.0.0.1:0".to_string(),
        accept_count: 2,
    }
}

/// Server side: echo every chat frame back, stamped with the sender's id.
fn chat_server() -> Arc<dyn Handler> {
    FnHandler::shared(HandlerKind::new("chat-server"), CHAT..CHAT + 1, |ctx: &Context<'_>, payload: &[u8]| {
        let mut message: ChatMessage = MsgPackCodec::decode(payload)?;
        message.from = ctx.session().id().map(|id| id.get()).unwrap_or_default();
        ctx.send(MsgPackCodec::encode_frame(CHAT_ECHO, &message)?);
        Ok(())
    })
}

fn collecting(received: Arc<parking_lot::Mutex<Vec<ChatMessage>>>) -> Arc<dyn Handler> {
    FnHandler::shared(HandlerKind::new("chat-client"), CHAT_ECHO..CHAT_ECHO + 1, move |_ctx, payload| {
        received.lock().push(MsgPackCodec::decode(payload)?);
        Ok(())
    })
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn start_server() -> (Arc<ServerContext>, Listener) {
    let context = ServerContext::new(ConnectionConfig::default());
    let listener = Listener::bind(ListenerConfig::for_server(&context, local(), vec![chat_server()]))
        .await
        .unwrap();
    (context, listener)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_then_application_frame_exactly_once() {
    let (context, listener) = start_server().await;

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let client = ClientBuilder::new()
        .handler(collecting(received.clone()))
        .connect(listener.local_addr())
        .await
        .unwrap();

    let id = tokio::time::timeout(TIMEOUT, client.identified()).await.unwrap();
    assert!(!client.connection().handlers().contains(HANDSHAKE_KIND));
    assert_eq!(client.connection().handlers().len(), 1);

    let message = ChatMessage {
        from: 0,
        text: "hello".to_string(),
    };
    assert!(client.send(MsgPackCodec::encode_frame(CHAT, &message).unwrap()));

    eventually(|| !received.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from, id.get());
    assert_eq!(received[0].text, "hello");
    assert!(context.registry.get(id).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clients_get_distinct_identities() {
    let (context, listener) = start_server().await;

    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = ClientBuilder::new().connect(listener.local_addr()).await.unwrap();
        ids.push(tokio::time::timeout(TIMEOUT, client.identified()).await.unwrap());
        clients.push(client);
    }

    ids.sort_by_key(|id| id.get());
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(context.registry.len(), 3);
    assert_eq!(listener.accepted(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broadcast_reaches_every_client() {
    let (context, listener) = start_server().await;

    let mut inboxes = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let client = ClientBuilder::new()
            .handler(collecting(received.clone()))
            .connect(listener.local_addr())
            .await
            .unwrap();
        tokio::time::timeout(TIMEOUT, client.identified()).await.unwrap();
        inboxes.push(received);
        clients.push(client);
    }
    eventually(|| context.registry.len() == 3).await;

    let notice = ChatMessage {
        from: 0,
        text: "server restarting".to_string(),
    };
    let segment = Segment::new(MsgPackCodec::encode_frame(CHAT_ECHO, &notice).unwrap());
    assert_eq!(context.registry.broadcast(segment), 3);

    for inbox in &inboxes {
        eventually(|| inbox.lock().len() == 1).await;
        assert_eq!(inbox.lock()[0], notice);
    }
}

#[derive(Default)]
struct Lifecycle {
    attached: AtomicUsize,
    detached: AtomicUsize,
}

impl SessionObserver for Lifecycle {
    fn on_attached(&self, _session: &Arc<Session>, _connection: &Arc<sessionwire::Connection>) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn on_detached(&self, _session: &Arc<Session>) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_disconnect_detaches_server_session() {
    let lifecycle = Arc::new(Lifecycle::default());
    let context = ServerContext::new(ConnectionConfig::default());
    let observer = lifecycle.clone();
    let config = ListenerConfig::for_server(&context, local(), vec![chat_server()])
        .session_factory(move || Session::with_observer(observer.clone()));
    let listener = Listener::bind(config).await.unwrap();

    let client = ClientBuilder::new().connect(listener.local_addr()).await.unwrap();
    let id = tokio::time::timeout(TIMEOUT, client.identified()).await.unwrap();
    let server_session = context.registry.get(id).unwrap();
    assert!(server_session.is_attached());

    assert!(client.disconnect());
    tokio::time::timeout(TIMEOUT, client.wait_for_shutdown()).await.unwrap();

    eventually(|| !server_session.is_attached()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Transport loss never removes a session from the registry.
    assert_eq!(context.registry.len(), 1);
    assert_eq!(lifecycle.attached.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.detached.load(Ordering::SeqCst), 1);
    assert!(!server_session.send(Segment::frame(CHAT_ECHO, b"gone")));
}

#[tokio::test]
async fn test_unknown_protocol_after_handshake_closes_connection() {
    let (_context, listener) = start_server().await;

    let client = ClientBuilder::new().connect(listener.local_addr()).await.unwrap();
    tokio::time::timeout(TIMEOUT, client.identified()).await.unwrap();

    client.send(Segment::frame(200, b"nobody serves this"));
    tokio::time::timeout(TIMEOUT, client.wait_for_shutdown()).await.unwrap();
    assert!(!client.connection().is_connected());
}

#[tokio::test]
async fn test_raw_socket_speaks_the_wire_format() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (context, listener) = start_server().await;
    let mut stream = tokio::net::TcpStream::connect(listener.local_addr()).await.unwrap();

    let message = ChatMessage {
        from: 0,
        text: "raw".to_string(),
    };
    let mut bytes = build_frame(sessionwire::protocol::CLIENT_HELLO, b"").to_vec();
    bytes.extend_from_slice(&MsgPackCodec::encode_frame(CHAT, &message).unwrap());
    stream.write_all(&bytes).await.unwrap();

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    let mut chunk = [0u8; 256];
    while frames.len() < 2 {
        let n = tokio::time::timeout(TIMEOUT, stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0);
        buffer.extend(&chunk[..n]).unwrap();
        while let Some(frame) = buffer.next_frame() {
            frames.push(frame);
        }
    }

    assert_eq!(frames[0].protocol_id(), sessionwire::protocol::SERVER_HELLO);
    assert_eq!(frames[1].protocol_id(), CHAT_ECHO);
    let echoed: ChatMessage = MsgPackCodec::decode(frames[1].payload()).unwrap();
    assert_eq!(echoed.text, "raw");
    assert_eq!(context.registry.len(), 1);
    assert!(frames[1].to_bytes().len() > HEADER_SIZE);
}
