//! A peer that never reads bounds the writer pool's outstanding bytes
//! rather than growing without limit.

use std::net::SocketAddrV4;
use std::time::Duration;

use meshnet::config::Config;
use meshnet::id::NodeId;
use meshnet::node::{Node, NodeObserver};
use meshnet::reconnect::Never;

#[derive(Default)]
struct Observer;
impl NodeObserver for Observer {}

fn free_loopback_addr() -> SocketAddrV4 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    match listener.local_addr().unwrap() {
        std::net::SocketAddr::V4(v4) => v4,
        _ => unreachable!(),
    }
}

#[test]
fn remain_bytes_stabilizes_under_a_non_reading_peer() {
    let addr = free_loopback_addr();

    let a_id = NodeId::new(1);
    let b_id = NodeId::new(2);

    let mut config = Config::default();
    config.chunk_size = 64;

    let mut a = Node::new(a_id, config.clone(), Box::new(Never), Observer).unwrap();
    a.add_listener(addr).unwrap();
    a.listen_default();

    let mut b = Node::new(b_id, config, Box::new(Never), Observer).unwrap();
    assert!(b.connect_host(addr));

    for _ in 0..200 {
        if a.writers().contains_key(&b_id) {
            break;
        }
        a.step(Duration::from_millis(5)).unwrap();
        b.step(Duration::from_millis(5)).unwrap();
    }

    let writer_socket = *a.writers().get(&b_id).expect("handshake must have completed");

    // B never calls step again past this point, so its socket buffer fills
    // and stops draining A's writes — the condition the scenario requires.
    let payload = vec![0u8; 1024 * 1024];
    a.send(writer_socket, 0, 0x10, &payload);

    let mut last = u64::MAX;
    let mut stable_rounds = 0;
    for _ in 0..50 {
        a.step(Duration::from_millis(5)).unwrap();
        let remain = a.writer_pool_remain_bytes();

        if remain == last {
            stable_rounds += 1;
        } else {
            stable_rounds = 0;
        }
        last = remain;

        if stable_rounds >= 5 {
            break;
        }
    }

    assert!(last <= payload.len() as u64);
    assert!(stable_rounds >= 5, "remain_bytes must stop shrinking once the socket buffer is full");
}
