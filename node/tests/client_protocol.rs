use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use link::Identity;
use node::client_protocol::serve_on;
use node::config::Config;
use node::Node;
use keys::Location;

async fn spawn_test_node() -> std::net::SocketAddr {
    let dir = tempfile::tempdir().unwrap();
    let chk_store = store::FileStore::open(dir.path().join("chk"), 16).unwrap();
    let ssk_store = store::FileStore::open(dir.path().join("ssk"), 16).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let node = Arc::new(Node::new(Config::default(), Identity::generate(), Location::from_raw(0.0), chk_store, ssk_store, tx));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(serve_on(listener, node));
    address
}

async fn read_until_end_message(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end().to_string();
        let done = line == "EndMessage";
        lines.push(line);
        if done {
            return lines;
        }
    }
}

#[tokio::test]
async fn hello_then_a_get_for_a_missing_key_fails_with_data_not_found() {
    let address = spawn_test_node().await;
    let stream = TcpStream::connect(address).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"ClientHello\nName=t\nExpectedVersion=2.0\nEndMessage\n").await.unwrap();
    let hello_reply = read_until_end_message(&mut reader).await;
    assert_eq!(hello_reply[0], "NodeHello");
    assert!(hello_reply.iter().any(|line| line.starts_with("ConnectionIdentifier=")));

    let uri = "CHK@AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=,\
               AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=,AAAD//8=/missing.txt";
    write_half.write_all(format!("ClientGet\nIdentifier=req1\nURI={}\nEndMessage\n", uri).as_bytes()).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), read_until_end_message(&mut reader)).await.unwrap();
    assert_eq!(reply[0], "GetFailed");
    assert!(reply.contains(&"Identifier=req1".to_string()));
    assert!(reply.iter().any(|line| line.starts_with("Code=")));
}

#[tokio::test]
async fn a_put_with_no_peers_still_succeeds_locally() {
    let address = spawn_test_node().await;
    let stream = TcpStream::connect(address).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"ClientHello\nName=t\nExpectedVersion=2.0\nEndMessage\n").await.unwrap();
    read_until_end_message(&mut reader).await;

    let uri = "CHK@AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=,\
               AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=,AAAD//8=";
    let data = vec![7u8; 32];
    write_half
        .write_all(format!("ClientPut\nIdentifier=put1\nURI={}\nDataLength={}\nData\n", uri, data.len()).as_bytes())
        .await
        .unwrap();
    write_half.write_all(&data).await.unwrap();
    write_half.write_all(b"EndMessage\n").await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), read_until_end_message(&mut reader)).await.unwrap();
    assert_eq!(reply[0], "PutSuccessful");
    assert!(reply.contains(&"Identifier=put1".to_string()));
    assert!(reply.iter().any(|line| line.starts_with("URI=CHK@")));
}

#[tokio::test]
async fn generate_ssk_returns_a_well_formed_ssk_uri_pair() {
    let address = spawn_test_node().await;
    let stream = TcpStream::connect(address).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"ClientHello\nName=t\nExpectedVersion=2.0\nEndMessage\n").await.unwrap();
    read_until_end_message(&mut reader).await;

    write_half.write_all(b"GenerateSSK\nIdentifier=gen1\nEndMessage\n").await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), read_until_end_message(&mut reader)).await.unwrap();
    assert_eq!(reply[0], "SSKKeypair");
    assert!(reply.iter().any(|line| line.starts_with("InsertURI=SSK@")));
    assert!(reply.iter().any(|line| line.starts_with("RequestURI=SSK@")));
}

#[tokio::test]
async fn a_non_hello_first_message_is_rejected_and_the_connection_closes() {
    let address = spawn_test_node().await;
    let stream = TcpStream::connect(address).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"ClientGet\nIdentifier=req1\nURI=x\nEndMessage\n").await.unwrap();
    let reply = read_until_end_message(&mut reader).await;
    assert_eq!(reply[0], "ProtocolError");
    assert!(reply.iter().any(|line| line == "Code=18"));
}
