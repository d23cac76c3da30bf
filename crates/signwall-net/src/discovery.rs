//! Where the other screens of a wall can be reached.
//!
//! Screens of one wall normally share a LAN, so their addresses are
//! provisioned rather than discovered: a peers file with one multiaddr per
//! line, plus an inline list from the environment.

use std::path::Path;

use libp2p::Multiaddr;
use tracing::{info, warn};

/// Read a peers file.
///
/// Blank lines and `#` comments are skipped. Unparseable lines are logged
/// and dropped. An unreadable file means no peers, not an error: a lone
/// screen still plays.
///
/// ```text
/// # lobby wall
/// /ip4/10.0.4.21/udp/4001/quic-v1
/// /ip4/10.0.4.22/udp/4001/quic-v1
/// ```
pub fn load_bootstrap_peers(path: &Path) -> Vec<Multiaddr> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Peers file unreadable, starting without peers");
            return Vec::new();
        }
    };

    let addrs: Vec<Multiaddr> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(parse_one)
        .collect();
    info!(path = %path.display(), count = addrs.len(), "Peers file loaded");
    addrs
}

/// Parse inline peer addresses, dropping the malformed ones.
pub fn parse_multiaddrs(raw: &[String]) -> Vec<Multiaddr> {
    raw.iter().map(|s| s.trim()).filter_map(parse_one).collect()
}

fn parse_one(raw: &str) -> Option<Multiaddr> {
    if raw.is_empty() {
        return None;
    }
    raw.parse()
        .map_err(|e| warn!(addr = raw, error = %e, "Ignoring malformed peer address"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_no_peers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_bootstrap_peers(&dir.path().join("peers.txt")).is_empty());
    }

    #[test]
    fn peers_file_skips_comments_and_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# lobby wall").unwrap();
        writeln!(file, "/ip4/10.0.4.21/udp/4001/quic-v1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "screen-3.local").unwrap();
        writeln!(file, "   /ip4/10.0.4.22/udp/4001/quic-v1 ").unwrap();
        file.flush().unwrap();

        let peers = load_bootstrap_peers(file.path());
        let expected: Multiaddr = "/ip4/10.0.4.22/udp/4001/quic-v1".parse().unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1], expected);
    }

    #[test]
    fn inline_list_is_trimmed() {
        let raw = vec![
            " /ip4/127.0.0.1/udp/4001/quic-v1".to_string(),
            "nope".to_string(),
            String::new(),
        ];
        assert_eq!(parse_multiaddrs(&raw).len(), 1);
    }
}
