//! Proxy actor behaviour against raw TCP peers and between two dispatchers.

use actors::{Context, Dispatcher, Handlers, ListenerKind, RuntimeError, Service};
use codec::{encode_frame, from_bytes, to_bytes, Handshake, HandshakeAck, ProxyEnvelope};
use crossbeam_channel::{unbounded, Receiver, Sender};
use node_config::{ProxyConfig, ShutdownConfig};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use types::{unix_timestamp_secs, ActorId, MessageId};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);
const SECRET: &str = "cluster-secret";
const ECHO: MessageId = 7;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("warn")
        .try_init();
}

fn proxy_config() -> ProxyConfig {
    ProxyConfig {
        secret: SECRET.to_string(),
        open_heartbeat: false,
        connect_timeout_ms: 1_000,
        reconnect_interval_ms: 100,
        ..ProxyConfig::default()
    }
}

fn dispatcher(proxy: ProxyConfig) -> Dispatcher {
    init_tracing();
    Dispatcher::new(
        proxy,
        ShutdownConfig {
            destroy_timeout_ms: 2_000,
            listener_close_timeout_ms: 1_000,
        },
    )
}

/// Records what it receives and echoes it back to the sender
struct Echo {
    tx: Sender<(Option<ActorId>, String)>,
}

impl Service for Echo {
    fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
        handlers.on_message(ECHO, |e: &mut Echo, ctx: &mut Context<'_>, text: String| {
            let _ = e.tx.send((ctx.last_sender(), text.clone()));
            let _ = ctx.reply(ECHO, text);
        })?;
        Ok(())
    }
}

/// Records only
struct Sink {
    tx: Sender<(Option<ActorId>, String)>,
}

impl Service for Sink {
    fn register_handlers(&self, handlers: &mut Handlers<Self>) -> Result<(), RuntimeError> {
        handlers.on_message(ECHO, |s: &mut Sink, ctx: &mut Context<'_>, text: String| {
            let _ = s.tx.send((ctx.last_sender(), text));
        })?;
        Ok(())
    }
}

fn free_port() -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

fn sink_node(id: u32, port: u16) -> (Dispatcher, Receiver<(Option<ActorId>, String)>) {
    let (tx, rx) = unbounded();
    let mut d = dispatcher(proxy_config());
    d.register_actor(ActorId::new(id), Sink { tx }).unwrap();
    d.set_service_listen_address(&format!("127.0.0.1:{}", port))
        .unwrap();
    d.start(2).unwrap();
    (d, rx)
}

fn listen_addr(d: &Dispatcher, wanted: ListenerKind) -> SocketAddr {
    d.listen_addresses()
        .into_iter()
        .find(|(kind, _)| *kind == wanted)
        .map(|(_, addr)| addr)
        .expect("listener bound")
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream
}

fn write_frame(stream: &mut TcpStream, body: &[u8]) {
    stream.write_all(&encode_frame(body).unwrap()).unwrap();
}

/// Next frame, heartbeats included. `None` on EOF or timeout.
fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).ok()?;
    let mut body = vec![0u8; u16::from_be_bytes(header) as usize];
    stream.read_exact(&mut body).ok()?;
    Some(body)
}

fn read_body(stream: &mut TcpStream) -> Option<Vec<u8>> {
    loop {
        let frame = read_frame(stream)?;
        if !frame.is_empty() {
            return Some(frame);
        }
    }
}

fn handshake(ids: &[u32], secret: &str) -> Handshake {
    Handshake::signed(
        ids.iter().copied().map(ActorId::new).collect(),
        unix_timestamp_secs(),
        secret,
    )
}

fn envelope(source: u32, destination: u32, text: &str) -> Vec<u8> {
    ProxyEnvelope::new(
        ActorId::new(source),
        ActorId::new(destination),
        ECHO,
        to_bytes(&text.to_string()).unwrap(),
    )
    .encode_body()
    .to_vec()
}

fn single_node(listen: ListenerKind, proxy: ProxyConfig) -> (Dispatcher, Receiver<(Option<ActorId>, String)>, SocketAddr) {
    let (tx, rx) = unbounded();
    let mut d = dispatcher(proxy);
    d.register_actor(ActorId::new(5), Echo { tx }).unwrap();
    match &listen {
        ListenerKind::Admin => d.set_admin_listen_address("127.0.0.1:0").unwrap(),
        _ => d.set_service_listen_address("127.0.0.1:0").unwrap(),
    }
    d.start(2).unwrap();
    let addr = listen_addr(&d, listen);
    (d, rx, addr)
}

#[test]
fn test_inbound_handshake_then_envelope_round_trip() {
    let (mut d, rx, addr) = single_node(ListenerKind::Service, proxy_config());
    let mut peer = connect(addr);

    write_frame(&mut peer, &to_bytes(&handshake(&[50], SECRET)).unwrap());
    let ack: HandshakeAck = from_bytes(&read_body(&mut peer).unwrap()).unwrap();
    assert_eq!(ack, HandshakeAck::accepted(vec![ActorId::new(5)]));

    write_frame(&mut peer, &envelope(50, 5, "hello"));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        (Some(ActorId::new(50)), "hello".to_string())
    );

    // The reply to actor 50 goes back over the session that carries it
    let reply = ProxyEnvelope::from_body(&read_body(&mut peer).unwrap()).unwrap();
    assert_eq!(reply.source, ActorId::new(5));
    assert_eq!(reply.destination, ActorId::new(50));
    assert_eq!(reply.message_id, ECHO);
    assert_eq!(from_bytes::<String>(&reply.payload).unwrap(), "hello");

    d.stop();
}

#[test]
fn test_flipped_signature_is_rejected_and_closed() {
    let (mut d, rx, addr) = single_node(ListenerKind::Service, proxy_config());
    let mut peer = connect(addr);

    let mut forged = handshake(&[50], SECRET);
    let first = forged.signature.remove(0);
    forged.signature.insert(0, if first == '0' { '1' } else { '0' });

    // Envelope sent right behind the handshake must never be delivered
    let mut bytes = encode_frame(&to_bytes(&forged).unwrap()).unwrap().to_vec();
    bytes.extend_from_slice(&encode_frame(&envelope(50, 5, "sneaky")).unwrap());
    peer.write_all(&bytes).unwrap();

    let ack: HandshakeAck = from_bytes(&read_body(&mut peer).unwrap()).unwrap();
    assert!(!ack.success);
    assert!(read_frame(&mut peer).is_none(), "connection should be closed");
    assert!(rx.recv_timeout(QUIET).is_err());

    d.stop();
}

#[test]
fn test_malformed_handshake_closes_connection() {
    let (mut d, _rx, addr) = single_node(ListenerKind::Service, proxy_config());
    let mut peer = connect(addr);

    write_frame(&mut peer, &[0x00]);
    assert!(read_frame(&mut peer).is_none());
    d.stop();
}

#[test]
fn test_admin_session_injects_without_binding() {
    let (mut d, rx, addr) = single_node(ListenerKind::Admin, proxy_config());
    let mut admin = connect(addr);

    write_frame(&mut admin, &to_bytes(&handshake(&[60], SECRET)).unwrap());
    let ack: HandshakeAck = from_bytes(&read_body(&mut admin).unwrap()).unwrap();
    assert!(ack.success);

    write_frame(&mut admin, &envelope(60, 5, "admin says hi"));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        (Some(ActorId::new(60)), "admin says hi".to_string())
    );

    // Admin sessions carry no actors, so the echo is cached instead
    admin
        .set_read_timeout(Some(QUIET))
        .unwrap();
    assert!(read_body(&mut admin).is_none());
    d.stop();
}

#[test]
fn test_session_pool_exhaustion_closes_new_socket() {
    let proxy = ProxyConfig {
        max_sessions: 1,
        ..proxy_config()
    };
    let (mut d, _rx, addr) = single_node(ListenerKind::Service, proxy);

    let mut first = connect(addr);
    write_frame(&mut first, &to_bytes(&handshake(&[50], SECRET)).unwrap());
    assert!(read_body(&mut first).is_some());

    let mut second = connect(addr);
    assert!(read_frame(&mut second).is_none());
    d.stop();
}

#[test]
fn test_heartbeats_sent_and_idle_session_closed() {
    let proxy = ProxyConfig {
        open_heartbeat: true,
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 200,
        ..proxy_config()
    };
    let (mut d, _rx, addr) = single_node(ListenerKind::Service, proxy);
    let mut peer = connect(addr);

    write_frame(&mut peer, &to_bytes(&handshake(&[50], SECRET)).unwrap());
    assert!(read_body(&mut peer).is_some());

    // Stay silent: heartbeats arrive until the proxy gives up on us
    let mut heartbeats = 0;
    while let Some(frame) = read_frame(&mut peer) {
        assert!(frame.is_empty());
        heartbeats += 1;
    }
    assert!(heartbeats >= 1);
    d.stop();
}

#[test]
fn test_cached_messages_flush_in_order_once_peer_comes_up() {
    let port = free_port();

    // Node A knows actor 20 lives at a port nobody listens on yet
    let mut a = dispatcher(proxy_config());
    let (a_tx, _a_rx) = unbounded();
    a.register_actor(ActorId::new(1), Sink { tx: a_tx }).unwrap();
    a.register_remote_actor(ActorId::new(20), "127.0.0.1", port)
        .unwrap();
    a.start(2).unwrap();

    for text in ["m1", "m2", "m3"] {
        a.send(ActorId::new(1), ActorId::new(20), ECHO, text.to_string())
            .unwrap();
    }

    // Node B comes up on that port hosting actor 20
    let (b_tx, b_rx) = unbounded();
    let mut b = dispatcher(proxy_config());
    b.register_actor(ActorId::new(20), Sink { tx: b_tx }).unwrap();
    b.set_service_listen_address(&format!("127.0.0.1:{}", port))
        .unwrap();
    b.start(2).unwrap();

    let received: Vec<_> = (0..3)
        .map(|_| b_rx.recv_timeout(WAIT).expect("flushed message"))
        .collect();
    assert_eq!(
        received,
        vec![
            (Some(ActorId::new(1)), "m1".to_string()),
            (Some(ActorId::new(1)), "m2".to_string()),
            (Some(ActorId::new(1)), "m3".to_string()),
        ]
    );
    assert!(b_rx.recv_timeout(QUIET).is_err(), "flushed exactly once");

    // Once running, sends go straight through
    a.send(ActorId::new(1), ActorId::new(20), ECHO, "m4".to_string())
        .unwrap();
    assert_eq!(
        b_rx.recv_timeout(WAIT).unwrap(),
        (Some(ActorId::new(1)), "m4".to_string())
    );

    a.stop();
    b.stop();
}

#[test]
fn test_running_session_loss_recaches_until_reconnect() {
    let port = free_port();
    let (mut b, b_rx) = sink_node(20, port);

    let mut a = dispatcher(proxy_config());
    let (a_tx, _a_rx) = unbounded();
    a.register_actor(ActorId::new(1), Sink { tx: a_tx }).unwrap();
    a.register_remote_actor(ActorId::new(20), "127.0.0.1", port)
        .unwrap();
    a.start(2).unwrap();

    a.send(ActorId::new(1), ActorId::new(20), ECHO, "m1".to_string())
        .unwrap();
    assert_eq!(b_rx.recv_timeout(WAIT).unwrap().1, "m1");

    // Peer goes away; give node A time to see the close and unbind 20
    b.stop();
    drop(b);
    thread::sleep(Duration::from_millis(500));

    a.send(ActorId::new(1), ActorId::new(20), ECHO, "m2".to_string())
        .unwrap();

    let (mut b, b_rx) = sink_node(20, port);
    assert_eq!(
        b_rx.recv_timeout(WAIT).unwrap(),
        (Some(ActorId::new(1)), "m2".to_string())
    );
    assert!(b_rx.recv_timeout(QUIET).is_err(), "delivered exactly once");

    a.stop();
    b.stop();
}

#[test]
fn test_rejected_outbound_session_is_not_redialed() {
    let peer = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = peer.local_addr().unwrap().port();

    let mut a = dispatcher(proxy_config());
    let (a_tx, _a_rx) = unbounded();
    a.register_actor(ActorId::new(1), Sink { tx: a_tx }).unwrap();
    a.register_remote_actor(ActorId::new(30), "127.0.0.1", port)
        .unwrap();
    a.start(2).unwrap();

    let (mut conn, _) = peer.accept().unwrap();
    conn.set_read_timeout(Some(WAIT)).unwrap();
    let hello: Handshake = from_bytes(&read_body(&mut conn).unwrap()).unwrap();
    assert_eq!(hello.actor_ids, vec![ActorId::new(1)]);
    assert!(hello.verify(SECRET));

    write_frame(&mut conn, &to_bytes(&HandshakeAck::rejected()).unwrap());
    assert!(read_frame(&mut conn).is_none(), "rejected session is closed");

    // Several reconnect intervals pass without a second dial
    peer.set_nonblocking(true).unwrap();
    let deadline = Instant::now() + Duration::from_millis(800);
    while Instant::now() < deadline {
        assert!(peer.accept().is_err(), "session was redialed");
        thread::sleep(Duration::from_millis(20));
    }
    a.stop();
}
