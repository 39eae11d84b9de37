//! End-to-end routing behaviour over the in-memory transport.

use bytes::Bytes;
use relay_core::{Router, RouterConfig, USER_ID_ATTRIBUTE};
use relay_protocol::{Envelope, SocketEvent};
use relay_transport::{ConnectionId, EventHandler, MemoryTransport, Transport};
use std::collections::HashSet;
use std::sync::Arc;

/// Connect `n` clients and return (connection, identity) pairs.
async fn connect_many(
    router: &Router,
    transport: &MemoryTransport,
    n: usize,
) -> Vec<(ConnectionId, String)> {
    let mut clients = Vec::with_capacity(n);
    for _ in 0..n {
        let conn = transport.open();
        router.on_connect(transport, &conn).await;
        let identity = transport.get_attribute(&conn, USER_ID_ATTRIBUTE).unwrap();
        clients.push((conn, identity));
    }
    transport.clear_sent();
    clients
}

fn encode(envelope: &Envelope) -> Bytes {
    relay_protocol::encode(envelope).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_get_distinct_identities() {
    let router = Arc::new(Router::new());
    let transport = Arc::new(MemoryTransport::new());

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let router = router.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                let conn = transport.open();
                router.on_connect(transport.as_ref(), &conn).await;
                conn
            })
        })
        .collect();

    let mut conns = Vec::new();
    for task in tasks {
        conns.push(task.await.unwrap());
    }

    assert_eq!(router.identities().len(), 200);

    let identities: HashSet<_> = conns
        .iter()
        .map(|c| transport.get_attribute(c, USER_ID_ATTRIBUTE).unwrap())
        .collect();
    assert_eq!(identities.len(), 200);

    for conn in &conns {
        let identity = transport.get_attribute(conn, USER_ID_ATTRIBUTE).unwrap();
        assert_eq!(router.identities().resolve(&identity).as_ref(), Some(conn));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_connects_and_disconnects_keep_registry_consistent() {
    let router = Arc::new(Router::with_config(RouterConfig {
        announce_arrivals: false,
        ..RouterConfig::default()
    }));
    let transport = Arc::new(MemoryTransport::new());

    // Half of the 1000 connections also disconnect.
    let tasks: Vec<_> = (0..1000)
        .map(|i| {
            let router = router.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                let conn = transport.open();
                router.on_connect(transport.as_ref(), &conn).await;
                if i % 2 == 0 {
                    transport.disconnect(&conn);
                    router.on_disconnect(transport.as_ref(), &conn).await;
                    transport.remove(&conn);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(router.identities().len(), 500);
    assert_eq!(transport.connection_count(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_connect_matched_by_disconnect_empties_registry() {
    let router = Arc::new(Router::with_config(RouterConfig {
        leave_rooms_on_disconnect: true,
        ..RouterConfig::default()
    }));
    let transport = Arc::new(MemoryTransport::new());

    let tasks: Vec<_> = (0..1000)
        .map(|i| {
            let router = router.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                let conn = transport.open();
                router.on_connect(transport.as_ref(), &conn).await;
                if i % 3 == 0 {
                    let identity = transport.get_attribute(&conn, USER_ID_ATTRIBUTE).unwrap();
                    router.join_room("lobby", &identity).unwrap();
                }
                tokio::task::yield_now().await;
                transport.disconnect(&conn);
                router.on_disconnect(transport.as_ref(), &conn).await;
                transport.remove(&conn);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert!(router.identities().is_empty());
    assert_eq!(router.rooms().room_count(), 0);
    assert_eq!(transport.connection_count(), 0);
}

#[tokio::test]
async fn addressed_message_reaches_only_recipient() {
    let router = Router::new();
    let transport = MemoryTransport::new();
    let clients = connect_many(&router, &transport, 3).await;
    let (a, id_a) = &clients[0];
    let (b, id_b) = &clients[1];
    let (c, _) = &clients[2];

    let payload = encode(&Envelope::direct(id_a.as_str(), id_b.as_str(), "hi"));
    router.on_message(&transport, a, payload.clone()).await;

    assert_eq!(transport.sent(b), vec![payload]);
    assert_eq!(transport.sent_count(a), 0);
    assert_eq!(transport.sent_count(c), 0);
}

#[tokio::test]
async fn room_message_reaches_members_with_raw_payload() {
    let router = Router::new();
    let transport = MemoryTransport::new();
    let clients = connect_many(&router, &transport, 4).await;
    let (a, id_a) = &clients[0];
    let (b, id_b) = &clients[1];
    let (c, id_c) = &clients[2];
    let (d, _) = &clients[3];

    router.join_room("R", id_b).unwrap();
    router.join_room("R", id_c).unwrap();

    // Extra whitespace and unknown fields must survive untouched.
    let payload = Bytes::from(format!(
        r#"{{ "from": "{id_a}", "room": "R", "data": "hi", "meta": {{"x": 1}} }}"#
    ));
    router.on_message(&transport, a, payload.clone()).await;

    assert_eq!(transport.sent(b), vec![payload.clone()]);
    assert_eq!(transport.sent(c), vec![payload]);
    assert_eq!(transport.sent_count(a), 0);
    assert_eq!(transport.sent_count(d), 0);
}

#[tokio::test]
async fn room_member_who_disconnected_is_skipped() {
    let router = Router::new();
    let transport = MemoryTransport::new();
    let clients = connect_many(&router, &transport, 3).await;
    let (a, id_a) = &clients[0];
    let (b, id_b) = &clients[1];
    let (c, id_c) = &clients[2];

    router.join_room("R", id_b).unwrap();
    router.join_room("R", id_c).unwrap();

    transport.disconnect(c);
    router.on_disconnect(&transport, c).await;
    transport.remove(c);

    // Membership is stale, but delivery to the rest still succeeds.
    assert_eq!(router.room_members("R").len(), 2);

    let payload = encode(&Envelope::room(id_a.as_str(), "R", "still here?"));
    router.on_message(&transport, a, payload.clone()).await;
    assert_eq!(transport.sent(b), vec![payload]);
}

#[tokio::test]
async fn unreachable_and_malformed_messages_send_nothing() {
    let router = Router::new();
    let transport = MemoryTransport::new();
    let clients = connect_many(&router, &transport, 2).await;
    let (a, id_a) = &clients[0];
    let (b, id_b) = &clients[1];

    let ghost = encode(&Envelope::direct(id_a.as_str(), "zzzzzzzz", "anyone?"));
    router.on_message(&transport, a, ghost).await;
    router.on_message(&transport, a, Bytes::from_static(b"definitely not json")).await;
    assert_eq!(transport.total_sent(), 0);

    let ok = encode(&Envelope::direct(id_a.as_str(), id_b.as_str(), "after the noise"));
    router.on_message(&transport, a, ok.clone()).await;
    assert_eq!(transport.sent(b), vec![ok]);
}

#[tokio::test]
async fn notices_are_distinguishable_from_chat() {
    let router = Router::new();
    let transport = MemoryTransport::new();

    let a = transport.open();
    router.on_connect(&transport, &a).await;
    let id_a = transport.get_attribute(&a, USER_ID_ATTRIBUTE).unwrap();

    let b = transport.open();
    router.on_connect(&transport, &b).await;
    let id_b = transport.get_attribute(&b, USER_ID_ATTRIBUTE).unwrap();

    let chat = encode(&Envelope::direct(id_b.as_str(), id_a.as_str(), "hello"));
    router.on_message(&transport, &b, chat).await;

    // a: welcome, arrival of b, chat from b
    let frames = transport.sent(&a);
    assert_eq!(frames.len(), 3);

    let kinds: Vec<bool> = frames
        .iter()
        .map(|f| SocketEvent::from_bytes(f).is_some())
        .collect();
    assert_eq!(kinds, vec![true, true, false]);
    assert!(Envelope::parse(&frames[2]).is_ok());
}
