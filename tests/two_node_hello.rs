//! A listens, B connects, and the lower node id ends up the canonical
//! writer.

use std::net::SocketAddrV4;
use std::time::Duration;

use meshnet::config::Config;
use meshnet::id::NodeId;
use meshnet::node::{Node, NodeObserver};
use meshnet::reconnect::Never;

#[derive(Default)]
struct Observer {
    ready: Vec<NodeId>,
}

impl NodeObserver for Observer {
    fn on_node_ready(&mut self, peer: NodeId) {
        self.ready.push(peer);
    }
}

fn free_loopback_addr() -> SocketAddrV4 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    match listener.local_addr().unwrap() {
        std::net::SocketAddr::V4(v4) => v4,
        _ => unreachable!(),
    }
}

fn run_until(a: &mut Node<Observer>, b: &mut Node<Observer>, mut done: impl FnMut(&Node<Observer>, &Node<Observer>) -> bool) {
    for _ in 0..200 {
        if done(a, b) {
            return;
        }
        a.step(Duration::from_millis(5)).unwrap();
        b.step(Duration::from_millis(5)).unwrap();
    }
    panic!("condition never became true within the deadline");
}

#[test]
fn lower_id_becomes_writer_higher_id_becomes_reader() {
    let real_addr = free_loopback_addr();

    let a_id = NodeId::new(1);
    let b_id = NodeId::new(2);

    let mut a = Node::new(a_id, Config::default(), Box::new(Never), Observer::default()).unwrap();
    a.add_listener(real_addr).unwrap();
    a.listen_default();

    let mut b = Node::new(b_id, Config::default(), Box::new(Never), Observer::default()).unwrap();
    assert!(b.connect_host(real_addr));

    run_until(&mut a, &mut b, |a, b| {
        a.writers().contains_key(&b_id) && b.readers().contains_key(&a_id)
    });

    assert!(a.writers().contains_key(&b_id));
    assert!(b.readers().contains_key(&a_id));
    assert_eq!(a.observer().ready, vec![b_id]);
    assert_eq!(b.observer().ready, vec![a_id]);
}
