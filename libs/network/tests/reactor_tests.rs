//! Reactor, connection and listener behaviour over real loopback sockets.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use network::{
    ConnectionMonitor, ListenerMonitor, PendingConnection, Reactor, ReactorHandle,
    TransportError,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Event {
    Connected(bool),
    Data(Vec<u8>),
    Closed { self_initiated: bool, error: bool },
}

struct Recorder {
    tx: Sender<Event>,
    /// Consume input in units of this many bytes
    unit: usize,
}

impl ConnectionMonitor for Recorder {
    fn on_connected(&self, result: network::Result<()>) {
        let _ = self.tx.send(Event::Connected(result.is_ok()));
    }

    fn on_received(&self, data: &[u8]) -> usize {
        let _ = self.tx.send(Event::Data(data.to_vec()));
        data.len() / self.unit * self.unit
    }

    fn on_closed(&self, self_initiated: bool, error: Option<TransportError>) {
        let _ = self.tx.send(Event::Closed {
            self_initiated,
            error: error.is_some(),
        });
    }
}

fn recorder(unit: usize) -> (Arc<Recorder>, Receiver<Event>) {
    let (tx, rx) = unbounded();
    (Arc::new(Recorder { tx, unit }), rx)
}

struct AcceptQueue {
    accepted: Sender<PendingConnection>,
    closed: Mutex<u32>,
}

impl ListenerMonitor for AcceptQueue {
    fn on_accept(&self, result: network::Result<PendingConnection>) {
        if let Ok(pending) = result {
            let _ = self.accepted.send(pending);
        }
    }

    fn on_closed(&self, _error: Option<TransportError>) {
        *self.closed.lock() += 1;
    }
}

fn start_reactor() -> (ReactorHandle, JoinHandle<()>) {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let thread = std::thread::spawn(move || reactor.run(|_| None));
    (handle, thread)
}

fn any_local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn collect_data(rx: &Receiver<Event>, want: usize) -> Vec<u8> {
    let mut seen = Vec::new();
    while seen.len() < want {
        match rx.recv_timeout(WAIT).unwrap() {
            Event::Data(data) => seen.extend_from_slice(&data),
            other => panic!("unexpected event {other:?}"),
        }
    }
    seen
}

#[test]
fn test_connect_exchange_and_close() {
    let (reactor, thread) = start_reactor();
    let (accept_tx, accept_rx) = unbounded();
    let queue = Arc::new(AcceptQueue {
        accepted: accept_tx,
        closed: Mutex::new(0),
    });
    let listener = reactor.bind(any_local(), queue.clone()).unwrap();

    let (client_mon, client_rx) = recorder(1);
    let client = reactor.connect(listener.local_addr(), WAIT, client_mon);
    assert_eq!(client_rx.recv_timeout(WAIT).unwrap(), Event::Connected(true));
    client.send(Bytes::from_static(b"ping")).unwrap();

    let pending = accept_rx.recv_timeout(WAIT).unwrap();
    let (server_mon, server_rx) = recorder(1);
    let server = reactor.attach(pending, server_mon);
    assert_eq!(collect_data(&server_rx, 4), b"ping");

    server.send(Bytes::from_static(b"pong")).unwrap();
    assert_eq!(collect_data(&client_rx, 4), b"pong");

    client.close();
    assert_eq!(
        client_rx.recv_timeout(WAIT).unwrap(),
        Event::Closed { self_initiated: true, error: false }
    );
    assert_eq!(
        server_rx.recv_timeout(WAIT).unwrap(),
        Event::Closed { self_initiated: false, error: false }
    );
    assert!(client.send(Bytes::from_static(b"late")).is_err());

    listener.close();
    assert!(listener.wait_closed(WAIT));
    assert_eq!(*queue.closed.lock(), 1);

    reactor.shutdown();
    thread.join().unwrap();
}

#[test]
fn test_unconsumed_bytes_are_presented_again() {
    let (reactor, thread) = start_reactor();
    let (accept_tx, accept_rx) = unbounded();
    let listener = reactor
        .bind(
            any_local(),
            Arc::new(AcceptQueue {
                accepted: accept_tx,
                closed: Mutex::new(0),
            }),
        )
        .unwrap();

    let (client_mon, client_rx) = recorder(1);
    let client = reactor.connect(listener.local_addr(), WAIT, client_mon);
    assert_eq!(client_rx.recv_timeout(WAIT).unwrap(), Event::Connected(true));

    let (server_mon, server_rx) = recorder(2);
    let _server = reactor.attach(accept_rx.recv_timeout(WAIT).unwrap(), server_mon);

    client.send(Bytes::from_static(b"abc")).unwrap();
    // Wait until the odd byte is left over
    loop {
        match server_rx.recv_timeout(WAIT).unwrap() {
            Event::Data(data) if data.len() % 2 == 1 && data.ends_with(b"c") => break,
            Event::Data(_) => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    client.send(Bytes::from_static(b"d")).unwrap();
    loop {
        match server_rx.recv_timeout(WAIT).unwrap() {
            Event::Data(data) if data == b"cd" => break,
            Event::Data(_) => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }

    reactor.shutdown();
    thread.join().unwrap();
}

#[test]
fn test_connect_refused_reports_failure() {
    let (reactor, thread) = start_reactor();
    let addr = {
        let probe = std::net::TcpListener::bind(any_local()).unwrap();
        probe.local_addr().unwrap()
    };

    let (mon, rx) = recorder(1);
    let conn = reactor.connect(addr, WAIT, mon);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Event::Connected(false));
    // No close callback for a connection that never opened
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    drop(conn);

    reactor.shutdown();
    thread.join().unwrap();
}

#[test]
fn test_bind_conflict_is_synchronous() {
    let (reactor, thread) = start_reactor();
    let (tx, _rx) = unbounded();
    let queue = Arc::new(AcceptQueue {
        accepted: tx,
        closed: Mutex::new(0),
    });
    let first = reactor.bind(any_local(), queue.clone()).unwrap();
    assert!(reactor.bind(first.local_addr(), queue).is_err());

    reactor.shutdown();
    thread.join().unwrap();
}

#[test]
fn test_timer_fires_and_cancel_suppresses() {
    let (reactor, thread) = start_reactor();
    let (tx, rx) = unbounded();

    let fired = tx.clone();
    let _kept = reactor.schedule(Duration::from_millis(20), move || {
        let _ = fired.send("kept");
    });
    let cancelled = reactor.schedule(Duration::from_millis(100), move || {
        let _ = tx.send("cancelled");
    });
    cancelled.cancel();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "kept");
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    reactor.shutdown();
    thread.join().unwrap();
}

#[test]
fn test_run_polls_due_callback() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let (tx, rx) = unbounded();
    let thread = std::thread::spawn(move || {
        let mut calls = 0u32;
        reactor.run(move |now| {
            calls += 1;
            let _ = tx.send(calls);
            Some(now + Duration::from_millis(5))
        })
    });

    // Several wake-ups well inside the idle wait
    let mut last = 0;
    while last < 5 {
        last = rx.recv_timeout(WAIT).unwrap();
    }
    handle.shutdown();
    thread.join().unwrap();
}
