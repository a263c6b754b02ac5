mod support;

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use support::{read_pdu, write_pdu};
use zcrab::config::GatewayConfig;
use zcrab::wire_protocol::Pdu;
use zcrab::{Driver, Gateway};

/// A client talks to a fake target through the real event loop.
#[test]
fn handshake_travels_through_the_gateway() {
    let target = TcpListener::bind("127.0.0.1:0").unwrap();
    let target_addr = target.local_addr().unwrap();

    let fake_target = thread::spawn(move || {
        let (mut s, _) = target.accept().unwrap();
        let init = read_pdu(&mut s);
        write_pdu(
            &mut s,
            &Pdu::init_response(true).with_reference_id(init.header.reference_id.clone()),
        );
        init
    });

    let config = GatewayConfig {
        default_target: Some(target_addr.to_string()),
        ..GatewayConfig::default()
    };

    let mut driver = Driver::new(Gateway::new()).unwrap();
    let (listener, addr) = driver.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    driver.with_handler(|gw, links| gw.attach_root(links, listener, Arc::new(config)));

    let stop = Arc::new(AtomicBool::new(false));
    let waker = driver.waker();

    let client_stop = stop.clone();
    let client_waker = waker.clone();
    let client = thread::spawn(move || {
        let mut s = TcpStream::connect(addr).unwrap();
        write_pdu(
            &mut s,
            &Pdu::init_request(None).with_reference_id(Some("hello".into())),
        );
        let answer = read_pdu(&mut s);

        client_stop.store(true, Ordering::Relaxed);
        let _ = client_waker.wake();
        answer
    });

    let watchdog_stop = stop.clone();
    let _watchdog = thread::spawn(move || {
        thread::sleep(Duration::from_secs(5));
        watchdog_stop.store(true, Ordering::Relaxed);
        let _ = waker.wake();
    });

    driver.run(&stop, |_, _| {}).unwrap();

    let answer = client.join().unwrap();
    assert_eq!(answer.body, Pdu::init_response(true).body);
    assert_eq!(answer.header.reference_id.as_deref(), Some("hello"));

    let seen = fake_target.join().unwrap();
    assert!(seen.is_init_request());
    assert_eq!(seen.header.reference_id.as_deref(), Some("hello"));
}
