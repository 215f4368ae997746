// Integration tests for tcpipc-server
//
// These tests host a real service on 127.0.0.1:0, then talk to it through
// the tcpipc client or through a raw TCP stream.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tcpipc_client::{Client, ClientConfig};
use tcpipc_common::contract::{BulkPayload, MethodTable, Reply};
use tcpipc_common::transport::PositionalJsonCodec;
use tcpipc_common::{remote_contract, Result, TcpipcError};
use tcpipc_server::{Dispatcher, Server, ServerConfig, ServerEvent, ServerHandle};

// ============================================================================
// Test Service
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    name: String,
    quantity: u32,
    tags: Vec<String>,
}

remote_contract! {
    #[proxy(InventoryProxy)]
    trait Inventory {
        fn add_item(&mut self, item: Item) -> usize;
        fn items(&mut self) -> Vec<Item>;
        fn fail(&mut self, message: String);
        fn panic_now(&mut self) -> u32;
        fn export(&mut self, size: usize) -> BulkPayload;
        fn thread_name(&mut self) -> String;
    }
}

#[derive(Default)]
struct Store {
    items: Vec<Item>,
}

impl Inventory for Store {
    fn add_item(&mut self, item: Item) -> Result<usize> {
        self.items.push(item);
        Ok(self.items.len())
    }

    fn items(&mut self) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }

    fn fail(&mut self, message: String) -> Result<()> {
        Err(TcpipcError::remote(message))
    }

    fn panic_now(&mut self) -> Result<u32> {
        panic!("store exploded")
    }

    fn export(&mut self, size: usize) -> Result<BulkPayload> {
        Ok(BulkPayload::from_bytes(vec![0xAB; size]))
    }

    fn thread_name(&mut self) -> Result<String> {
        Ok(std::thread::current().name().unwrap_or("").to_string())
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn start_server() -> ServerHandle {
    Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .listen()
        .unwrap()
}

fn item(name: &str) -> Item {
    Item {
        name: name.to_string(),
        quantity: 3,
        tags: vec!["a".to_string(), "b".to_string()],
    }
}

/// Raw line-level access to a server.
struct RawPeer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl RawPeer {
    fn connect(handle: &ServerHandle) -> Self {
        let stream = TcpStream::connect(handle.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\n").unwrap();
    }

    fn recv(&mut self) -> serde_json::Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Whether the server closed the stream.
    fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.reader.read(&mut buf), Ok(0))
    }
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_structured_values_round_trip() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();
    let mut inventory = client.proxy::<dyn Inventory>();

    assert_eq!(inventory.add_item(item("bolt")).unwrap(), 1);
    assert_eq!(inventory.add_item(item("nut")).unwrap(), 2);
    assert_eq!(inventory.items().unwrap(), vec![item("bolt"), item("nut")]);

    handle.shutdown();
}

#[test]
fn test_fault_then_next_call_succeeds() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();
    let mut inventory = client.proxy::<dyn Inventory>();

    let err = inventory.fail("out of stock".to_string()).unwrap_err();
    assert!(matches!(err, TcpipcError::Remote(ref m) if m == "out of stock"), "got {:?}", err);

    assert_eq!(inventory.add_item(item("washer")).unwrap(), 1);
    handle.shutdown();
}

#[test]
fn test_panicking_method_becomes_fault() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();
    let mut inventory = client.proxy::<dyn Inventory>();

    let err = inventory.panic_now().unwrap_err();
    assert!(matches!(err, TcpipcError::Remote(ref m) if m == "store exploded"), "got {:?}", err);
    assert!(inventory.items().unwrap().is_empty());
    handle.shutdown();
}

#[test]
fn test_unknown_method_is_fault_and_session_survives() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();

    let err = client.call("restock", vec![json!(1)]).unwrap_err();
    match err {
        TcpipcError::Remote(message) => {
            assert_eq!(message, "method 'restock' is not part of contract 'Inventory'")
        }
        other => panic!("unexpected error {:?}", other),
    }

    let reply = client.call("items", vec![]).unwrap();
    assert_eq!(reply.into_return::<Vec<Item>>().unwrap(), vec![]);
    handle.shutdown();
}

#[test]
fn test_bad_arguments_are_faults() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();

    let err = client.call("add_item", vec![]).unwrap_err();
    assert!(matches!(err, TcpipcError::Remote(ref m) if m.contains("expects 1 argument(s)")));

    let err = client.call("add_item", vec![json!("not an item")]).unwrap_err();
    assert!(matches!(err, TcpipcError::Remote(_)));

    assert!(!client.is_closed());
    handle.shutdown();
}

#[test]
fn test_methods_run_on_dispatcher_thread() {
    let handle = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_config(ServerConfig::new().with_dispatcher_name("inventory-dispatcher"))
        .listen()
        .unwrap();
    let client = Client::connect(handle.local_addr()).unwrap();
    let mut inventory = client.proxy::<dyn Inventory>();

    assert_eq!(inventory.thread_name().unwrap(), "inventory-dispatcher");
    handle.shutdown();
}

#[test]
fn test_servers_can_share_a_dispatcher() {
    let dispatcher = Dispatcher::named("shared").unwrap();
    let first = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_dispatcher(dispatcher.clone())
        .listen()
        .unwrap();
    let second = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_dispatcher(dispatcher.clone())
        .listen()
        .unwrap();

    for handle in [&first, &second] {
        let client = Client::connect(handle.local_addr()).unwrap();
        let mut inventory = client.proxy::<dyn Inventory>();
        assert_eq!(inventory.thread_name().unwrap(), "shared");
    }

    first.shutdown();
    // an injected dispatcher outlives the servers using it
    assert!(dispatcher.is_running());
    second.shutdown();
    dispatcher.shutdown();
}

#[test]
fn test_hand_built_method_table() {
    let table = MethodTable::<u64>::builder("Counter")
        .method("next", |count: &mut u64, _args| {
            *count += 1;
            Ok(Reply::Plain(json!(*count)))
        })
        .build()
        .unwrap();
    let handle = Server::with_table(0u64, table).listen().unwrap();
    let client = Client::connect(handle.local_addr()).unwrap();

    assert_eq!(client.call("next", vec![]).unwrap().into_return::<u64>().unwrap(), 1);
    assert_eq!(client.call("next", vec![]).unwrap().into_return::<u64>().unwrap(), 2);
    handle.shutdown();
}

// ============================================================================
// Wire Level
// ============================================================================

#[test]
fn test_undecodable_line_gets_fault_and_session_survives() {
    let handle = start_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send("{not json");
    let response = peer.recv();
    assert_eq!(response["CaughtException"], json!(true));
    assert_eq!(response["IsBulky"], json!(false));
    assert!(response["ReturnValue"].as_str().unwrap().contains("Malformed call request"));

    peer.send(r#"{"MethodName":"items","Arguments":[]}"#);
    let response = peer.recv();
    assert_eq!(response["CaughtException"], json!(false));
    assert_eq!(response["ReturnValue"], json!([]));
    handle.shutdown();
}

#[test]
fn test_empty_line_ends_session() {
    let handle = start_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send("");
    assert!(peer.is_closed());
    handle.shutdown();
}

#[test]
fn test_bulk_exchange_on_the_wire() {
    let handle = start_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send(r#"{"MethodName":"export","Arguments":[5]}"#);
    let response = peer.recv();
    assert_eq!(response["IsBulky"], json!(true));
    assert_eq!(response["ReturnValue"], json!(5));

    peer.send("ready_for_bulk");
    let mut bytes = [0u8; 5];
    peer.reader.read_exact(&mut bytes).unwrap();
    assert_eq!(bytes, [0xAB; 5]);

    peer.send(r#"{"MethodName":"items","Arguments":[]}"#);
    assert_eq!(peer.recv()["ReturnValue"], json!([]));
    handle.shutdown();
}

#[test]
fn test_wrong_bulk_acknowledgement_ends_session() {
    let handle = start_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send(r#"{"MethodName":"export","Arguments":[5]}"#);
    assert_eq!(peer.recv()["IsBulky"], json!(true));

    peer.send("NOT_READY");
    assert!(peer.is_closed());
    handle.shutdown();
}

#[test]
fn test_padded_bulk_acknowledgement_is_rejected() {
    let handle = start_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send(r#"{"MethodName":"export","Arguments":[5]}"#);
    assert_eq!(peer.recv()["IsBulky"], json!(true));

    peer.send("  READY_FOR_BULK  ");
    assert!(peer.is_closed());
    handle.shutdown();
}

// ============================================================================
// Codecs
// ============================================================================

fn start_positional_server() -> ServerHandle {
    Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_codec(PositionalJsonCodec)
        .listen()
        .unwrap()
}

#[test]
fn test_positional_codec_call_cycle() {
    let handle = start_positional_server();
    let client =
        Client::connect_with_codec(handle.local_addr(), ClientConfig::default(), PositionalJsonCodec)
            .unwrap();
    let mut inventory = client.proxy::<dyn Inventory>();

    assert_eq!(inventory.add_item(item("bolt")).unwrap(), 1);
    assert_eq!(inventory.items().unwrap(), vec![item("bolt")]);

    match inventory.fail("no stock".to_string()) {
        Err(TcpipcError::Remote(message)) => assert_eq!(message, "no stock"),
        other => panic!("expected remote fault, got {:?}", other),
    }

    let payload = inventory.export(100_000).unwrap();
    assert_eq!(payload.into_bytes().unwrap(), vec![0xAB; 100_000]);
    assert_eq!(inventory.items().unwrap().len(), 1);
    handle.shutdown();
}

#[test]
fn test_positional_codec_on_the_wire() {
    let handle = start_positional_server();
    let mut peer = RawPeer::connect(&handle);

    peer.send(r#"["export",[3]]"#);
    assert_eq!(peer.recv(), json!([false, true, 3]));
    peer.send("READY_FOR_BULK");
    let mut bytes = [0u8; 3];
    peer.reader.read_exact(&mut bytes).unwrap();
    assert_eq!(bytes, [0xAB; 3]);

    // a line in the default codec's shape does not decode
    peer.send(r#"{"MethodName":"items","Arguments":[]}"#);
    let fault = peer.recv();
    assert_eq!(fault[0], json!(true));
    assert_eq!(fault[1], json!(false));

    peer.send(r#"["items",[]]"#);
    assert_eq!(peer.recv(), json!([false, false, []]));
    handle.shutdown();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_connection_events_are_reported() {
    let (events, received) = mpsc::channel();
    let events = std::sync::Mutex::new(events);
    let handle = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .on_event(move |event| {
            let _ = events.lock().unwrap().send(event);
        })
        .listen()
        .unwrap();

    let client = Client::connect(handle.local_addr()).unwrap();
    client.call("items", vec![]).unwrap();

    let connected = received.recv_timeout(Duration::from_secs(5)).unwrap();
    let peer = match connected {
        ServerEvent::ClientConnected(addr) => addr,
        other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(handle.connected_clients(), vec![peer]);

    client.close();
    let disconnected = received.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(disconnected, ServerEvent::ClientDisconnected(peer));
    handle.shutdown();
}

#[test]
fn test_connected_clients_registry() {
    let handle = start_server();
    let client = Client::connect(handle.local_addr()).unwrap();
    client.call("items", vec![]).unwrap();

    assert_eq!(handle.connected_clients().len(), 1);

    client.close();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.connected_clients().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(handle.connected_clients().is_empty());
    handle.shutdown();
}

#[test]
fn test_shutdown_with_idle_clients_is_bounded() {
    let handle = start_server();
    let clients: Vec<Client> = (0..3)
        .map(|_| Client::connect(handle.local_addr()).unwrap())
        .collect();
    for client in &clients {
        client.call("items", vec![]).unwrap();
    }

    let started = Instant::now();
    handle.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));

    for client in &clients {
        assert!(client.call("items", vec![]).is_err());
    }
}

#[test]
fn test_idle_server_accepts_without_delay() {
    let handle = start_server();

    let mut total = Duration::ZERO;
    for _ in 0..10 {
        thread::sleep(Duration::from_millis(60));
        let started = Instant::now();
        let client = Client::connect(handle.local_addr()).unwrap();
        client.call("items", vec![]).unwrap();
        total += started.elapsed();
        client.close();
    }

    assert!(total < Duration::from_millis(150), "ten connects took {:?}", total);
    handle.shutdown();
}

#[test]
fn test_shutdown_of_wildcard_listener_is_bounded() {
    let handle = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_config(ServerConfig::new().with_bind_addr("0.0.0.0:0"))
        .listen()
        .unwrap();
    let client = Client::connect(("127.0.0.1", handle.local_addr().port())).unwrap();
    client.call("items", vec![]).unwrap();

    let started = Instant::now();
    handle.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(client.call("items", vec![]).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = Server::new::<dyn Inventory>(Store::default())
        .unwrap()
        .with_config(ServerConfig::new().with_bulk_chunk_size(0))
        .listen();
    assert!(matches!(result, Err(TcpipcError::Configuration(_))));
}
