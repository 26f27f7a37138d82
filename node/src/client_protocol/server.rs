use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use keys::{KeyType, Uri};
use request::{Request, RequestError, RequestId, RequestState, RequestTracker, TerminalStatus};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use crate::node::{FetchOutcome, InsertOutcome, Node};

use super::codec::{read_message, write_message};
use super::message::{ProtocolError, ProtocolErrorCode, TextMessage};

const PROTOCOL_VERSION: &str = "0.7.0";
const BUILD: &str = "1";

/// Binds the client-protocol listener and serves connections forever
/// (§6.2). Localhost-only by policy, regardless of the configured
/// bind address's host.
pub async fn serve(node: Arc<Node>) -> std::io::Result<()> {
    let listener = TcpListener::bind(node.config.client_protocol.bind_address).await?;
    serve_on(listener, node).await
}

/// Same as `serve`, but on a caller-supplied listener — lets tests bind
/// an ephemeral port and learn its address before accepting.
pub async fn serve_on(listener: TcpListener, node: Arc<Node>) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(error) = handle_connection(stream, node).await {
                tracing::debug!(%error, "client connection ended");
            }
        });
    }
}

/// One client connection: its own request tracker (so `Identifier`
/// collisions and `RemoveRequest` are scoped per connection, §6.2),
/// and one task per active request.
async fn handle_connection(stream: TcpStream, node: Arc<Node>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let tracker = RequestTracker::new(256);
    let mut identifiers: HashMap<String, RequestId> = HashMap::new();
    let mut next_id: u64 = 1;
    let mut saw_hello = false;

    loop {
        let parsed = match read_message(&mut reader).await? {
            None => return Ok(()),
            Some(parsed) => parsed,
        };

        let message = match parsed {
            Ok(message) => message,
            Err(error) => {
                write_message(&mut write_half, &error.clone().into_message()).await?;
                if error.fatal {
                    return Ok(());
                }
                continue;
            }
        };

        if !saw_hello {
            if message.name != "ClientHello" {
                let error = ProtocolError {
                    code: ProtocolErrorCode::ClientHelloMustBeFirst,
                    description: "the first message on a connection must be ClientHello".to_string(),
                    fatal: true,
                };
                write_message(&mut write_half, &error.into_message()).await?;
                return Ok(());
            }
            saw_hello = true;
            let reply = TextMessage::new("NodeHello")
                .with_field("ConnectionIdentifier", format!("{:x}", rand::random::<u64>()))
                .with_field("Version", PROTOCOL_VERSION)
                .with_field("Build", BUILD)
                .with_field("Testnet", "false")
                .with_field("Node", "smallworld");
            write_message(&mut write_half, &reply).await?;
            continue;
        }

        match message.name.as_str() {
            "ClientGet" => {
                if let Err(error) = handle_client_get(&node, &message, &tracker, &mut identifiers, &mut next_id, &mut write_half).await? {
                    write_message(&mut write_half, &error.into_message()).await?;
                }
            }
            "RemoveRequest" => {
                if let Ok(identifier) = message.required_field("Identifier") {
                    if let Some(id) = identifiers.remove(identifier) {
                        tracker.remove(id);
                        write_message(&mut write_half, &TextMessage::new("RequestRemoved").with_field("Identifier", identifier)).await?;
                    }
                }
            }
            "ClientPut" => {
                if let Err(error) = handle_client_put(&node, &message, &mut write_half).await? {
                    write_message(&mut write_half, &error.into_message()).await?;
                }
            }
            "GenerateSSK" => {
                // Placeholder key material only: this node has no DSA
                // keypair generation wired up, so the returned URI is
                // not backed by anything it could later sign an SSK
                // insert with (see DESIGN.md).
                let mut routing_key = [0u8; 32];
                let mut crypto_key = [0u8; 32];
                rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut routing_key);
                rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut crypto_key);
                let uri = Uri {
                    key_type: KeyType::Ssk,
                    routing_key: Some(routing_key),
                    crypto_key: Some(crypto_key),
                    extra: Some(keys::Extra {
                        reserved_or_version: 0,
                        flag_byte: 0,
                        algorithm: keys::CryptoAlgorithm::AesCtr256Sha256,
                        compression: None,
                    }),
                    docname: None,
                    suggested_edition: None,
                    meta: Vec::new(),
                };
                let mut reply = TextMessage::new("SSKKeypair").with_field("InsertURI", uri.serialize()).with_field("RequestURI", uri.serialize());
                if let Some(id) = message.field("Identifier") {
                    reply = reply.with_field("Identifier", id);
                }
                write_message(&mut write_half, &reply).await?;
            }
            "GetNode" => {
                let reply = TextMessage::new("NodeData")
                    .with_field("Identity", hex::encode(node.identity.identity_hash()))
                    .with_field("Location", node.own_location.lock().value())
                    .with_field("PeerCount", node.peer_table.len())
                    .with_field("Version", PROTOCOL_VERSION)
                    .with_field("Build", BUILD);
                write_message(&mut write_half, &reply).await?;
            }
            "Disconnect" => return Ok(()),
            _ => {
                let error = ProtocolError {
                    code: ProtocolErrorCode::MessageParse,
                    description: format!("unsupported message: {}", message.name),
                    fatal: false,
                };
                write_message(&mut write_half, &error.into_message()).await?;
            }
        }
    }
}

async fn handle_client_get(
    node: &Arc<Node>,
    message: &TextMessage,
    tracker: &RequestTracker,
    identifiers: &mut HashMap<String, RequestId>,
    next_id: &mut u64,
    write_half: &mut (impl tokio::io::AsyncWrite + Unpin),
) -> std::io::Result<Result<(), ProtocolError>> {
    let identifier = match message.required_field("Identifier") {
        Ok(id) => id.to_string(),
        Err(error) => return Ok(Err(error)),
    };
    let uri_str = match message.required_field("URI") {
        Ok(uri) => uri.to_string(),
        Err(error) => return Ok(Err(error)),
    };

    if identifiers.contains_key(&identifier) {
        return Ok(Err(ProtocolError {
            code: ProtocolErrorCode::IdentifierCollision,
            description: format!("identifier already in use: {}", identifier),
            fatal: false,
        }));
    }

    let uri = match Uri::parse(&uri_str) {
        Ok(uri) => uri,
        Err(parse_error) => {
            return Ok(Err(ProtocolError {
                code: ProtocolErrorCode::UriParse,
                description: parse_error.to_string(),
                fatal: false,
            }))
        }
    };

    let routing_key = match uri.routing_key {
        Some(key) => key,
        None => {
            return Ok(Err(ProtocolError {
                code: ProtocolErrorCode::UriParse,
                description: "URI carries no routing key".to_string(),
                fatal: false,
            }))
        }
    };

    let request_id = RequestId(*next_id);
    *next_id += 1;
    identifiers.insert(identifier.clone(), request_id);
    let deadline = node.default_deadline();
    let request = Request::new(request_id, routing_key, 18, deadline, false);
    if let Err(RequestError::CapacityExceeded) = tracker.register(request) {
        return Ok(Err(ProtocolError {
            code: ProtocolErrorCode::TooManyActive,
            description: "too many active requests on this connection".to_string(),
            fatal: false,
        }));
    }
    let _ = tracker.with_request(request_id, |r| r.transition(RequestState::Running));

    let outcome = match uri.key_type {
        KeyType::Chk => node.fetch_chk(&routing_key, uri.crypto_key, 18, deadline).await,
        KeyType::Ssk | KeyType::Usk => node.fetch_ssk(&routing_key, 18, deadline).await,
        KeyType::Ksk => {
            return Ok(Err(ProtocolError {
                code: ProtocolErrorCode::UriParse,
                description: "KSK resolution is not supported by this node".to_string(),
                fatal: false,
            }))
        }
    };

    match outcome {
        FetchOutcome::Found(data) => {
            let _ = tracker.with_request(request_id, |r| r.record_received(data.len() as u64));
            write_message(write_half, &TextMessage::new("DataFound").with_field("Identifier", &identifier).with_field("DataLength", data.len())).await?;
            write_message(write_half, &TextMessage::new("AllData").with_field("Identifier", &identifier).with_data(data)).await?;
        }
        FetchOutcome::RecentlyFailed(until) => {
            let wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64;
            write_message(
                write_half,
                &TextMessage::new("GetFailed")
                    .with_field("Identifier", &identifier)
                    .with_field("Code", "recently-failed")
                    .with_field("WaitMillis", wait_ms),
            )
            .await?;
        }
        FetchOutcome::Failed(status) => {
            write_message(write_half, &TextMessage::new("GetFailed").with_field("Identifier", &identifier).with_field("Code", status_code(status))).await?;
        }
    }

    Ok(Ok(()))
}

/// Only CHK inserts are supported (see DESIGN.md): an SSK/KSK/USK
/// `URI` is rejected with `ProtocolErrorCode::Internal` rather than
/// silently mis-handled.
async fn handle_client_put(
    node: &Arc<Node>,
    message: &TextMessage,
    write_half: &mut (impl tokio::io::AsyncWrite + Unpin),
) -> std::io::Result<Result<(), ProtocolError>> {
    let identifier = match message.required_field("Identifier") {
        Ok(id) => id.to_string(),
        Err(error) => return Ok(Err(error)),
    };
    let uri_str = match message.required_field("URI") {
        Ok(uri) => uri.to_string(),
        Err(error) => return Ok(Err(error)),
    };

    let uri = match Uri::parse(&uri_str) {
        Ok(uri) => uri,
        Err(parse_error) => {
            return Ok(Err(ProtocolError {
                code: ProtocolErrorCode::UriParse,
                description: parse_error.to_string(),
                fatal: false,
            }))
        }
    };
    if uri.key_type != KeyType::Chk {
        return Ok(Err(ProtocolError {
            code: ProtocolErrorCode::Internal,
            description: "only CHK inserts are supported by this node".to_string(),
            fatal: false,
        }));
    }

    let data = match &message.data {
        Some(data) => data.clone(),
        None => return Ok(Err(ProtocolError::missing_field("Data"))),
    };
    if data.len() > block::chk::DATA_LEN {
        return Ok(Err(ProtocolError {
            code: ProtocolErrorCode::FileTooBig,
            description: format!("data exceeds the {}-byte single-block limit", block::chk::DATA_LEN),
            fatal: false,
        }));
    }

    let mut plaintext = [0u8; block::chk::DATA_LEN];
    plaintext[..data.len()].copy_from_slice(&data);

    let deadline = node.default_deadline();
    let (result_uri, outcome) = node.insert_chk(&plaintext, 18, deadline).await;

    match outcome {
        InsertOutcome::Success => {
            write_message(
                write_half,
                &TextMessage::new("PutSuccessful").with_field("Identifier", &identifier).with_field("URI", result_uri.serialize()),
            )
            .await?;
        }
        InsertOutcome::Failed(status) => {
            write_message(write_half, &TextMessage::new("PutFailed").with_field("Identifier", &identifier).with_field("Code", status_code(status))).await?;
        }
    }

    Ok(Ok(()))
}

/// `GetFailed`'s `Code` field is numeric on the wire (§8 scenario 6
/// pins `DataNotFound` to 13); only that value is fixed by a literal
/// scenario, the rest of this table is this node's own consistent
/// assignment (see DESIGN.md).
fn status_code(status: TerminalStatus) -> u32 {
    match status {
        TerminalStatus::Success => 0,
        TerminalStatus::RouteNotFound => 3,
        TerminalStatus::TransferFailed => 9,
        TerminalStatus::TimedOut => 10,
        TerminalStatus::VerifyFailure => 11,
        TerminalStatus::DataNotFound => 13,
        TerminalStatus::RejectedOverload => 14,
        TerminalStatus::Cancelled => 2,
    }
}
