use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bittorrent_client::handshake::Extension;
use bittorrent_client::metainfo::{Content, Metainfo};
use bittorrent_client::{client, peer_id, to_hex, tracker};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Number of leading piece hashes to print
const DISPLAY_PIECES: usize = 3;

#[derive(Parser)]
struct Cli {
    /// Filepath to metainfo (`.torrent`) file
    metainfo: PathBuf,

    /// Port announced to the tracker as the one we listen on
    #[arg(long, default_value_t = 6881)]
    port: u16,

    /// Number of peers to attempt handshakes with
    #[arg(long, default_value_t = 5)]
    max_peers: usize,

    /// Seconds to wait for each handshake attempt
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

fn human_readable_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}

fn print_metainfo(metainfo: &Metainfo) {
    println!("Torrent Name: {}", metainfo.info.name);
    println!("Announce URL: {}", metainfo.announce);
    println!("Piece Length: {} bytes", metainfo.info.piece_length);
    match &metainfo.info.content {
        Content::Single { length } => {
            println!("Single File Mode: {} ({} bytes)", metainfo.info.name, length)
        }
        Content::Multiple { files } => {
            println!("Multiple Files Mode: {} files", files.len());
            for (idx, file) in files.iter().enumerate() {
                println!(
                    "  File {}: {} ({} bytes)",
                    idx + 1,
                    file.path.join("/"),
                    file.length
                );
            }
        }
    }
    println!("Info Hash: {}", to_hex(&metainfo.info_hash()));

    let num_pieces = metainfo.num_pieces();
    println!("Number of Pieces: {}", num_pieces);
    println!("Total Size: {}", human_readable_size(metainfo.total_length()));

    let mut shown = (0..num_pieces.min(DISPLAY_PIECES)).collect::<Vec<_>>();
    if num_pieces > DISPLAY_PIECES {
        shown.push(num_pieces - 1);
    }
    for idx in shown {
        let label = if idx >= DISPLAY_PIECES {
            format!("Last Piece ({})", idx)
        } else {
            format!("Piece {}", idx)
        };
        match metainfo.piece_hash(idx) {
            Ok(hash) => println!(
                "{} Hash: {} (Length: {})",
                label,
                to_hex(&hash),
                human_readable_size(metainfo.piece_length(idx))
            ),
            Err(e) => error!("{}", e),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let metainfo = match Metainfo::from_file(&cli.metainfo) {
        Ok(val) => val,
        Err(e) => {
            error!("Unable to parse {:?}: {}", cli.metainfo, e);
            return ExitCode::FAILURE;
        }
    };
    print_metainfo(&metainfo);

    println!("\nDiscovering peers...");
    let peer_id = peer_id::generate();
    let peers = match tracker::announce(&metainfo, &peer_id, cli.port).await {
        Ok(response) => response.peers,
        Err(e) => {
            error!("Error discovering peers: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Found {} peers:", peers.len());
    for peer in peers.iter().take(cli.max_peers) {
        println!("  {}", peer);
    }
    if peers.len() > cli.max_peers {
        println!("... and {} more", peers.len() - cli.max_peers);
    }

    println!("\nAttempting handshakes with peers...");
    let candidates = &peers[..peers.len().min(cli.max_peers)];
    let attempt_timeout = Duration::from_secs(cli.timeout);
    match client::first_handshake(candidates, metainfo.info_hash(), peer_id, attempt_timeout).await
    {
        Some((peer, handshake, _stream)) => {
            println!("\nSuccessfully connected to peer: {}", peer);
            println!("Remote peer ID: {}", to_hex(handshake.peer_id()));
            for (extension, name) in [
                (Extension::Dht, "DHT"),
                (Extension::ExtensionProtocol, "Extension Protocol"),
                (Extension::Fast, "Fast Extension"),
            ] {
                if handshake.has_extension(extension) {
                    println!("Peer supports {}", name);
                }
            }
            ExitCode::SUCCESS
        }
        None => {
            println!("\nFailed to handshake with any peers");
            ExitCode::FAILURE
        }
    }
}
