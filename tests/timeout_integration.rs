//! Idle-timeout tests over real connections
//!
//! The idle timer is single-shot and resettable: arming replaces any pending
//! arming, an elapsed countdown fires exactly once, and a closed stream
//! swallows any later arming. These tests exercise the timer through the
//! session poll loop rather than in isolation.

use bytes::Bytes;
use muxlink::mux::{Client, Event, HeaderSet, Server};
use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_WAIT: Option<Duration> = Some(Duration::from_secs(2));

fn counter() -> (Rc<Cell<u32>>, impl FnMut()) {
    let count = Rc::new(Cell::new(0));
    let inner = Rc::clone(&count);
    (count, move || inner.set(inner.get() + 1))
}

/// The server arms an idle timer instead of answering. When it fires, the
/// handler responds and finishes the stream; a re-arm after that must never
/// fire because the stream is closed.
#[test]
fn test_server_timeout_fires_once_then_responds() {
    let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();

    let server_handle = thread::spawn(move || {
        let mut session = server.accept().unwrap();
        let (fired, callback) = counter();
        let (late_fired, late_callback) = counter();
        let mut late_callback = Some(late_callback);
        let mut timeouts = 0;

        loop {
            match session.poll(POLL_WAIT).unwrap() {
                Some(Event::StreamOpened { id, .. }) => {
                    session.set_stream_timeout(id, Duration::from_millis(50), callback);
                    break;
                }
                Some(_) => {}
                None => panic!("server timed out"),
            }
        }

        loop {
            match session.poll(POLL_WAIT).unwrap() {
                Some(Event::Timeout { id }) => {
                    timeouts += 1;
                    assert_eq!(fired.get(), 1);

                    session.respond(id, HeaderSet::response(200), false).unwrap();
                    session.send_data(id, Bytes::from("late"), true).unwrap();

                    // The stream just closed; this arming must be swallowed
                    session.set_stream_timeout(
                        id,
                        Duration::from_millis(10),
                        late_callback.take().unwrap(),
                    );
                }
                Some(Event::StreamClosed { .. }) => break,
                Some(_) => {}
                None => panic!("server timed out"),
            }
        }

        // Give the swallowed arming time to misfire if it were live. The
        // client may tear the session down inside this window, so teardown
        // events are fine; any further timer event is not.
        let quiet_until = Instant::now() + Duration::from_millis(60);
        while Instant::now() < quiet_until {
            match session.poll(Some(Duration::from_millis(10))) {
                Ok(Some(Event::Timeout { .. })) => timeouts += 1,
                Ok(Some(_)) | Ok(None) => {}
                Err(_) => break,
            }
        }
        assert_eq!(timeouts, 1);
        assert_eq!(fired.get(), 1);
        assert_eq!(late_fired.get(), 0);
    });

    let mut client = Client::connect(addr).unwrap();
    let armed_at = Instant::now();
    client
        .request_without_body(HeaderSet::request("GET", "/slow", "http", "localhost"))
        .unwrap();

    let mut status = None;
    let mut body = Vec::new();
    loop {
        match client.poll_event(POLL_WAIT).unwrap() {
            Some(Event::HeadersReceived { headers, .. }) => {
                status = headers.get(":status").map(String::from);
            }
            Some(Event::Data { chunk, .. }) => body.extend_from_slice(&chunk),
            Some(Event::End { .. }) => break,
            Some(_) => {}
            None => panic!("client timed out"),
        }
    }

    // The response only exists because the idle timer elapsed
    assert!(armed_at.elapsed() >= Duration::from_millis(50));
    assert_eq!(status.as_deref(), Some("200"));
    assert_eq!(body, b"late");

    client.close().unwrap();
    server_handle.join().unwrap();
}

/// A client-side timer on a stream the server never answers fires exactly
/// once, and the quiet stream produces nothing afterwards.
#[test]
fn test_client_timeout_fires_exactly_once() {
    let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();

    let server_handle = thread::spawn(move || {
        let mut session = server.accept().unwrap();
        // Deliberately never respond
        loop {
            match session.poll(POLL_WAIT) {
                Ok(Some(Event::SessionClosed)) | Ok(None) => break,
                Ok(Some(_)) => {}
                Err(_) => break,
            }
        }
    });

    let mut client = Client::connect(addr).unwrap();
    let id = client
        .request(HeaderSet::request("GET", "/never", "http", "localhost"))
        .unwrap();

    let (fired, callback) = counter();
    client.set_stream_timeout(id, Duration::from_millis(30), callback);

    match client.poll_event(POLL_WAIT).unwrap() {
        Some(Event::Timeout { id: got }) => assert_eq!(got, id),
        other => panic!("expected a timeout event, got {:?}", other),
    }
    assert_eq!(fired.get(), 1);

    // Single-shot: nothing further without a re-arm
    assert!(client
        .poll_event(Some(Duration::from_millis(80)))
        .unwrap()
        .is_none());
    assert_eq!(fired.get(), 1);

    client.close().unwrap();
    server_handle.join().unwrap();
}

/// Re-arming replaces the pending arming: only the second callback fires,
/// on the second duration.
#[test]
fn test_rearm_replaces_pending_arming() {
    let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();

    let server_handle = thread::spawn(move || {
        let mut session = server.accept().unwrap();
        loop {
            match session.poll(POLL_WAIT) {
                Ok(Some(Event::SessionClosed)) | Ok(None) => break,
                Ok(Some(_)) => {}
                Err(_) => break,
            }
        }
    });

    let mut client = Client::connect(addr).unwrap();
    let id = client
        .request(HeaderSet::request("GET", "/rearm", "http", "localhost"))
        .unwrap();

    let (first, first_callback) = counter();
    let (second, second_callback) = counter();

    client.set_stream_timeout(id, Duration::from_secs(30), first_callback);
    client.set_stream_timeout(id, Duration::from_millis(30), second_callback);

    let armed_at = Instant::now();
    match client.poll_event(POLL_WAIT).unwrap() {
        Some(Event::Timeout { id: got }) => assert_eq!(got, id),
        other => panic!("expected a timeout event, got {:?}", other),
    }

    // The replaced arming never fires, and the wait tracked the new duration
    assert!(armed_at.elapsed() < Duration::from_secs(30));
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);

    client.close().unwrap();
    server_handle.join().unwrap();
}
