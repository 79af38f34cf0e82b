use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ntex_bytes::Bytes;
use ntex_mqtt_session::{ClientError, ConnectError, Session, SessionConfig, State};
use ntex_util::time::Seconds;

mod common;
use self::common::*;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_tcp_session() {
    init_logger();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (tx, rx) = mpsc::channel();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();

        let mut connect = [0u8; 16];
        stream.read_exact(&mut connect).unwrap();
        tx.send(connect.to_vec()).unwrap();
        stream.write_all(CONNACK_ACCEPTED).unwrap();

        let mut publish = [0u8; 10];
        stream.read_exact(&mut publish).unwrap();
        tx.send(publish.to_vec()).unwrap();

        let mut disconnect = [0u8; 2];
        stream.read_exact(&mut disconnect).unwrap();
        tx.send(disconnect.to_vec()).unwrap();

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap_or(0);
        rest
    });

    let session = Session::build()
        .config(SessionConfig::new().set_keep_alive(Seconds(30)))
        .finish();
    session.connect("127.0.0.1", port, "c1").unwrap();
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        b"\x10\x0E\x00\x04MQTT\x04\x02\x00\x1E\x00\x02c1".to_vec()
    );
    assert!(wait_for(TIMEOUT, || session.is_connected()));

    session.publish("out", Bytes::from_static(b"abc")).unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), b"\x30\x08\x00\x03outabc".to_vec());

    session.disconnect().unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), DISCONNECT.to_vec());
    assert_eq!(session.state(), State::Disconnected);

    // nothing is written after DISCONNECT
    let rest = server.join().unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_tcp_connection_refused() {
    init_logger();

    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let session = Session::new();
    assert!(matches!(
        session.connect("127.0.0.1", port, "c1"),
        Err(ClientError::Connect(ConnectError::TransportFailure(_)))
    ));
    assert_eq!(session.state(), State::Disconnected);
}
