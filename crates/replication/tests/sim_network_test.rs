//! Tests for the in-memory feed network.
//!
//! # Test Strategy
//!
//! 1. **Node lifecycle**: start, address reuse
//! 2. **Admission**: refusal, capability secret, master identity
//! 3. **Logs**: sequencing and hash chaining
//! 4. **Replication**: follow-driven and eager copying over gossip links
//! 5. **Subscriptions**: history, live delivery, closure

use corelib::backend::{ConnectRequest, FeedBackend, FeedClient, StreamMode};
use corelib::{BackendError, Caps, Content, GossipLink, Keypair, Message, NodeConfig};
use futures::StreamExt;
use replication::{EagerStrategy, SimNetwork, SUBSCRIBER_BUFFER};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "test-network-secret";

fn config(port: u16, seed: u8) -> NodeConfig {
    let mut config = NodeConfig::builder(format!("/sim/{port}"))
        .port(port)
        .keys(Keypair::from_seed(&[seed; 32]))
        .caps(Caps::new(SECRET, None))
        .build()
        .unwrap();
    config.resolve_keys().unwrap();
    config
}

fn start(network: &SimNetwork, config: &NodeConfig) {
    network
        .start(config, config.keys.as_ref().unwrap())
        .expect("node starts");
}

fn connect_with(
    network: &SimNetwork,
    request: ConnectRequest,
) -> Result<Arc<dyn FeedClient>, BackendError> {
    let (tx, rx) = mpsc::channel();
    network.connect(request, Box::new(move |result| tx.send(result).unwrap()));
    rx.recv().unwrap()
}

fn connect(network: &SimNetwork, config: &NodeConfig) -> Arc<dyn FeedClient> {
    let request = ConnectRequest::for_node(config, config.keys.clone().unwrap());
    connect_with(network, request).expect("client connects")
}

fn publish(client: &Arc<dyn FeedClient>, content: Content) -> Result<Message, BackendError> {
    let (tx, rx) = mpsc::channel();
    client.publish(content, Box::new(move |result| tx.send(result).unwrap()));
    rx.recv().unwrap()
}

fn link(client: &Arc<dyn FeedClient>, to: &NodeConfig) {
    let (tx, rx) = mpsc::channel();
    let link = GossipLink::new(
        client.id().clone(),
        to.host.clone(),
        to.port,
        to.keys.as_ref().unwrap().id().clone(),
    );
    client.add_gossip_peer(link, Box::new(move |result| tx.send(result).unwrap()));
    rx.recv().unwrap().expect("link registered");
}

// ============================================================================
// Node Lifecycle & Admission
// ============================================================================

#[test]
fn test_port_reuse_is_rejected() {
    let network = SimNetwork::new();
    start(&network, &config(9001, 1));
    let second = config(9001, 2);
    let err = network.start(&second, second.keys.as_ref().unwrap()).unwrap_err();
    assert!(matches!(err, BackendError::AddressInUse(_)));
}

#[test]
fn test_node_ids_are_ordered_by_port() {
    let network = SimNetwork::new();
    assert!(network.node_ids().is_empty());

    let (high, low) = (config(9007, 1), config(9006, 2));
    start(&network, &high);
    start(&network, &low);

    let ids = network.node_ids();
    let expected: Vec<_> = [&low, &high]
        .iter()
        .map(|c| c.keys.as_ref().unwrap().id().clone())
        .collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_connect_to_silent_port_is_refused() {
    let network = SimNetwork::new();
    let absent = config(9002, 1);
    let request = ConnectRequest::for_node(&absent, absent.keys.clone().unwrap());
    let err = connect_with(&network, request).err().unwrap();
    assert!(matches!(err, BackendError::Refused(_)));
}

#[test]
fn test_wrong_secret_fails_handshake() {
    let network = SimNetwork::new();
    let node = config(9003, 1);
    start(&network, &node);

    let mut request = ConnectRequest::for_node(&node, node.keys.clone().unwrap());
    request.caps = Caps::new("another-network", None);
    let err = connect_with(&network, request).err().unwrap();
    assert!(matches!(err, BackendError::Handshake(_)));
}

#[test]
fn test_foreign_identity_is_unauthorized() {
    let network = SimNetwork::new();
    let node = config(9004, 1);
    start(&network, &node);

    let mut request = ConnectRequest::for_node(&node, node.keys.clone().unwrap());
    request.keys = Keypair::from_seed(&[99u8; 32]);
    let err = connect_with(&network, request).err().unwrap();
    assert!(matches!(err, BackendError::Unauthorized(_)));
}

#[test]
fn test_master_identity_is_admitted() {
    let network = SimNetwork::new();
    let master = Keypair::from_seed(&[42u8; 32]);
    let mut node = NodeConfig::builder("/sim/9005")
        .port(9005)
        .keys(Keypair::from_seed(&[5u8; 32]))
        .master(master.id().clone())
        .caps(Caps::new(SECRET, None))
        .build()
        .unwrap();
    node.resolve_keys().unwrap();
    start(&network, &node);

    let mut request = ConnectRequest::for_node(&node, node.keys.clone().unwrap());
    request.keys = master;
    assert!(connect_with(&network, request).is_ok());
}

// ============================================================================
// Logs
// ============================================================================

#[test]
fn test_publish_chains_entries() {
    let network = SimNetwork::new();
    let node = config(9010, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    let first = publish(&client, Content::about(client.id(), "alice")).unwrap();
    let second = publish(&client, Content::about(client.id(), "alice")).unwrap();

    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2);
    assert_eq!(first.previous, None);
    assert_eq!(second.previous.as_ref(), Some(&first.key));
    assert_ne!(first.key, second.key);
}

#[test]
fn test_read_only_log_rejects_publish() {
    let network = SimNetwork::new();
    let node = config(9011, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    network.set_read_only(client.id(), true);
    let err = publish(&client, Content::about(client.id(), "alice")).unwrap_err();
    assert!(matches!(err, BackendError::Storage(_)));
}

#[test]
fn test_closed_client_rejects_publish() {
    let network = SimNetwork::new();
    let node = config(9012, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    client.close();
    let err = publish(&client, Content::about(client.id(), "alice")).unwrap_err();
    assert_eq!(err, BackendError::Closed);
}

// ============================================================================
// Replication
// ============================================================================

#[test]
fn test_follow_replicates_followee_feed() {
    let network = SimNetwork::new();
    let (a, b) = (config(9020, 1), config(9021, 2));
    start(&network, &a);
    start(&network, &b);
    let alice = connect(&network, &a);
    let bob = connect(&network, &b);

    publish(&bob, Content::about(bob.id(), "bob")).unwrap();
    link(&alice, &b);
    assert!(network.connected(alice.id(), bob.id()));
    // Connected but not following yet: nothing copied.
    assert_eq!(network.held_sequence(alice.id(), bob.id()), 0);

    publish(&alice, Content::contact(bob.id(), true)).unwrap();
    assert_eq!(network.held_sequence(alice.id(), bob.id()), 1);

    publish(&bob, Content::about(bob.id(), "bobby")).unwrap();
    assert_eq!(network.held_sequence(alice.id(), bob.id()), 2);
    // Bob does not follow alice.
    assert_eq!(network.held_sequence(bob.id(), alice.id()), 0);
}

#[test]
fn test_link_to_wrong_key_does_not_connect() {
    let network = SimNetwork::new();
    let (a, b) = (config(9030, 1), config(9031, 2));
    start(&network, &a);
    start(&network, &b);
    let alice = connect(&network, &a);

    let (tx, rx) = mpsc::channel();
    let stranger = Keypair::from_seed(&[77u8; 32]);
    let bogus = GossipLink::new(alice.id().clone(), "localhost", b.port, stranger.id().clone());
    alice.add_gossip_peer(bogus, Box::new(move |r| tx.send(r).unwrap()));
    rx.recv().unwrap().unwrap();

    assert_eq!(network.links_of(alice.id()).len(), 1);
    assert!(!network.connected(alice.id(), b.keys.as_ref().unwrap().id()));
}

#[test]
fn test_eager_strategy_copies_everything_connected() {
    let network = SimNetwork::with_strategy(EagerStrategy);
    let (a, b) = (config(9040, 1), config(9041, 2));
    start(&network, &a);
    start(&network, &b);
    let alice = connect(&network, &a);
    let bob = connect(&network, &b);

    link(&alice, &b);
    publish(&alice, Content::about(alice.id(), "alice")).unwrap();
    assert_eq!(network.held_sequence(bob.id(), alice.id()), 1);
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_history_subscription_ends() {
    let network = SimNetwork::new();
    let node = config(9050, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    publish(&client, Content::about(client.id(), "alice")).unwrap();
    publish(&client, Content::contact(client.id(), true)).unwrap();

    let abouts: Vec<_> = client
        .messages_by_type("about", StreamMode::HISTORY)
        .collect()
        .await;
    assert_eq!(abouts.len(), 1);
    assert_eq!(abouts[0].as_ref().unwrap().msg_type(), "about");
}

#[tokio::test]
async fn test_live_subscription_delivers_new_entries() {
    let network = SimNetwork::new();
    let node = config(9051, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    let mut source = client.messages_by_type("about", StreamMode::FOLLOW);
    let idle = tokio::time::timeout(Duration::from_millis(50), source.next()).await;
    assert!(idle.is_err(), "nothing published yet");

    publish(&client, Content::contact(client.id(), true)).unwrap();
    publish(&client, Content::about(client.id(), "alice")).unwrap();

    let next = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .expect("entry delivered")
        .expect("stream open")
        .expect("no read error");
    assert_eq!(next.msg_type(), "about");
}

#[tokio::test]
async fn test_close_ends_live_subscription() {
    let network = SimNetwork::new();
    let node = config(9052, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    let mut source = client.messages_by_type("about", StreamMode::LIVE);
    client.close();
    let end = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .expect("closure ends the stream");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_lagging_subscription_reports_skipped_entries() {
    let network = SimNetwork::new();
    let node = config(9053, 1);
    start(&network, &node);
    let client = connect(&network, &node);

    let mut source = client.messages_by_type("about", StreamMode::LIVE);
    for _ in 0..SUBSCRIBER_BUFFER + 5 {
        publish(&client, Content::about(client.id(), "alice")).unwrap();
    }

    let lagged = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .expect("lag reported")
        .expect("stream open");
    assert!(matches!(lagged, Err(BackendError::Lagged(n)) if n > 0), "{lagged:?}");

    let end = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .expect("stream ends after lag");
    assert!(end.is_none());
}
