use std::env;
use std::fs;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use node::{config::Config, identity_store, location_store, Node};

fn main() -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run())
}

async fn run() -> std::io::Result<()> {
    let config = load_config()?;

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config.logging.filter.clone())).init();

    fs::create_dir_all(&config.datastore.directory)?;
    let chk_store = store::FileStore::open(config.datastore.directory.join("chk"), config.datastore.chk_slot_count)
        .map_err(std::io::Error::other)?;
    let ssk_store = store::FileStore::open(config.datastore.directory.join("ssk"), config.datastore.ssk_slot_count)
        .map_err(std::io::Error::other)?;

    let identity = identity_store::load_or_create(&config.datastore.directory)?;
    let own_location = location_store::load_or_create(&config.datastore.directory)?;

    tracing::info!(identity_hash = %hex::encode(identity.identity_hash()), location = own_location.value(), "starting node");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let node = Arc::new(Node::new(config, identity, own_location, chk_store, ssk_store, outbound_tx));

    let link_node = Arc::clone(&node);
    let link_task = tokio::spawn(async move { node::udp::run(link_node, outbound_rx).await });
    let client_task = tokio::spawn(node::client_protocol::serve(Arc::clone(&node)));

    tokio::select! {
        result = link_task => result.map_err(std::io::Error::other)??,
        result = client_task => result.map_err(std::io::Error::other)??,
    }
    Ok(())
}

fn load_config() -> std::io::Result<Config> {
    use std::str::FromStr;
    match env::args().nth(1) {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            Config::from_str(&contents).map_err(std::io::Error::other)
        }
        None => Ok(Config::default()),
    }
}
