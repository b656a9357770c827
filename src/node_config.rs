//! Resolved node configuration and peer selection
//!
//! A [`NodeConfig`] is the hand-off value between the bootstrap client and the
//! task client. It is built once per resolution round and never mutated.

use std::fmt;

use zeroize::Zeroizing;

use crate::proto::{self, NodeType};

/// Resolved configuration snapshot for this node
///
/// Fields are private; a fresh bootstrap round produces a fresh value.
/// Peer fields are empty when the corresponding peer was not found.
#[derive(Clone, Default)]
pub struct NodeConfig {
    node_id: u64,
    cert: Vec<u8>,
    key: Zeroizing<Vec<u8>>,
    rpc_address: String,
    target_cert: Vec<u8>,
    app_node_addr: String,
    app_node_cert: Vec<u8>,
}

impl NodeConfig {
    /// Start building a config by hand
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }

    /// Identifier of this node
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// This node's certificate (PEM)
    pub fn cert(&self) -> &[u8] {
        &self.cert
    }

    /// This node's private key (PEM)
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Address of the trusted execution peer
    pub fn rpc_address(&self) -> &str {
        &self.rpc_address
    }

    /// Certificate of the trusted execution peer
    pub fn target_cert(&self) -> &[u8] {
        &self.target_cert
    }

    /// Address of the application peer
    pub fn app_node_addr(&self) -> &str {
        &self.app_node_addr
    }

    /// Certificate of the application peer
    pub fn app_node_cert(&self) -> &[u8] {
        &self.app_node_cert
    }

    /// Whether a trusted execution peer was resolved
    pub fn has_trusted_execution_peer(&self) -> bool {
        !self.rpc_address.is_empty()
    }

    /// Whether an application peer was resolved
    pub fn has_application_peer(&self) -> bool {
        !self.app_node_addr.is_empty()
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("node_id", &self.node_id)
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .field("rpc_address", &self.rpc_address)
            .field("target_cert_len", &self.target_cert.len())
            .field("app_node_addr", &self.app_node_addr)
            .field("app_node_cert_len", &self.app_node_cert.len())
            .finish()
    }
}

/// One-shot builder for [`NodeConfig`]
#[derive(Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Set the local node identifier
    pub fn node_id(mut self, node_id: u64) -> Self {
        self.config.node_id = node_id;
        self
    }

    /// Set this node's certificate and private key
    pub fn identity(mut self, cert: Vec<u8>, key: Vec<u8>) -> Self {
        self.config.cert = cert;
        self.config.key = Zeroizing::new(key);
        self
    }

    /// Set the trusted execution peer's address and certificate
    pub fn trusted_execution_peer(mut self, address: impl Into<String>, cert: Vec<u8>) -> Self {
        self.config.rpc_address = address.into();
        self.config.target_cert = cert;
        self
    }

    /// Set the application peer's address and certificate
    pub fn application_peer(mut self, address: impl Into<String>, cert: Vec<u8>) -> Self {
        self.config.app_node_addr = address.into();
        self.config.app_node_cert = cert;
        self
    }

    /// Finish the config
    pub fn build(self) -> NodeConfig {
        self.config
    }
}

/// A node advertised by the configuration service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    /// Peer identifier
    pub id: u64,
    /// Network address
    pub address: String,
    /// Certificate (PEM)
    pub cert: Vec<u8>,
    /// Role of the peer
    pub node_type: NodeType,
}

impl From<proto::config::Peer> for Peer {
    fn from(peer: proto::config::Peer) -> Self {
        // Unknown wire values map to Invalid
        let node_type = peer.node_type();
        Self {
            id: peer.id,
            address: peer.address,
            cert: peer.cert,
            node_type,
        }
    }
}

/// First trusted execution peer and first application peer of a peer list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerSelection {
    trusted_execution: Option<Peer>,
    application: Option<Peer>,
}

impl PeerSelection {
    /// Scan `peers` once, keeping the first peer of each wanted type
    ///
    /// Stops as soon as both slots are filled. Later peers of an
    /// already-filled type are ignored, as are mesh and invalid peers.
    pub fn select<I>(peers: I) -> Self
    where
        I: IntoIterator<Item = Peer>,
    {
        let mut selection = Self::default();

        for peer in peers {
            match peer.node_type {
                NodeType::TrustedExecution if selection.trusted_execution.is_none() => {
                    selection.trusted_execution = Some(peer);
                }
                NodeType::Application if selection.application.is_none() => {
                    selection.application = Some(peer);
                }
                _ => {}
            }

            if selection.is_complete() {
                break;
            }
        }

        selection
    }

    /// Selected trusted execution peer
    pub fn trusted_execution(&self) -> Option<&Peer> {
        self.trusted_execution.as_ref()
    }

    /// Selected application peer
    pub fn application(&self) -> Option<&Peer> {
        self.application.as_ref()
    }

    /// Both peer types were found
    pub fn is_complete(&self) -> bool {
        self.trusted_execution.is_some() && self.application.is_some()
    }

    /// Neither peer type was found
    pub fn is_empty(&self) -> bool {
        self.trusted_execution.is_none() && self.application.is_none()
    }

    /// Copy the selected peers into `builder`
    pub fn apply(self, mut builder: NodeConfigBuilder) -> NodeConfigBuilder {
        if let Some(peer) = self.trusted_execution {
            builder = builder.trusted_execution_peer(peer.address, peer.cert);
        }
        if let Some(peer) = self.application {
            builder = builder.application_peer(peer.address, peer.cert);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: u64, node_type: NodeType) -> Peer {
        Peer {
            id,
            address: format!("10.0.0.{}:9000", id),
            cert: format!("cert-{}", id).into_bytes(),
            node_type,
        }
    }

    #[test]
    fn selects_first_of_each_type_in_any_order() {
        let orders = [
            vec![
                peer(1, NodeType::TrustedExecution),
                peer(2, NodeType::Application),
            ],
            vec![
                peer(2, NodeType::Application),
                peer(1, NodeType::TrustedExecution),
            ],
            vec![
                peer(5, NodeType::Mesh),
                peer(2, NodeType::Application),
                peer(6, NodeType::Invalid),
                peer(1, NodeType::TrustedExecution),
            ],
        ];

        for peers in orders {
            let selection = PeerSelection::select(peers);
            assert_eq!(selection.trusted_execution().unwrap().id, 1);
            assert_eq!(selection.application().unwrap().id, 2);
            assert!(selection.is_complete());
        }
    }

    #[test]
    fn later_duplicates_are_ignored() {
        let selection = PeerSelection::select(vec![
            peer(1, NodeType::TrustedExecution),
            peer(3, NodeType::TrustedExecution),
            peer(2, NodeType::Application),
            peer(4, NodeType::Application),
        ]);

        assert_eq!(selection.trusted_execution().unwrap().id, 1);
        assert_eq!(selection.application().unwrap().id, 2);
    }

    #[test]
    fn duplicate_application_before_trusted_execution_keeps_first() {
        let selection = PeerSelection::select(vec![
            peer(2, NodeType::Application),
            peer(4, NodeType::Application),
            peer(1, NodeType::TrustedExecution),
        ]);

        assert_eq!(selection.application().unwrap().id, 2);
        assert_eq!(selection.trusted_execution().unwrap().id, 1);
    }

    #[test]
    fn stops_scanning_once_both_found() {
        let mut consumed = 0;
        let peers = vec![
            peer(1, NodeType::TrustedExecution),
            peer(2, NodeType::Application),
            peer(3, NodeType::Mesh),
            peer(4, NodeType::Mesh),
        ];

        let selection = PeerSelection::select(peers.into_iter().inspect(|_| consumed += 1));

        assert!(selection.is_complete());
        assert_eq!(consumed, 2);
    }

    #[test]
    fn partial_and_empty_selections() {
        let only_tee = PeerSelection::select(vec![peer(1, NodeType::TrustedExecution)]);
        assert!(!only_tee.is_empty());
        assert!(!only_tee.is_complete());
        assert!(only_tee.application().is_none());

        let none = PeerSelection::select(vec![peer(3, NodeType::Mesh)]);
        assert!(none.is_empty());

        assert!(PeerSelection::select(Vec::new()).is_empty());
    }

    #[test]
    fn apply_fills_only_found_peers() {
        let selection = PeerSelection::select(vec![peer(2, NodeType::Application)]);
        let config = selection.apply(NodeConfig::builder().node_id(7)).build();

        assert_eq!(config.node_id(), 7);
        assert_eq!(config.app_node_addr(), "10.0.0.2:9000");
        assert_eq!(config.app_node_cert(), b"cert-2");
        assert!(config.rpc_address().is_empty());
        assert!(config.target_cert().is_empty());
        assert!(config.has_application_peer());
        assert!(!config.has_trusted_execution_peer());
    }

    #[test]
    fn wire_peer_with_unknown_type_maps_to_invalid() {
        let wire = proto::config::Peer {
            id: 9,
            address: "10.0.0.9:9000".to_string(),
            cert: b"cert".to_vec(),
            node_type: 42,
        };

        let peer = Peer::from(wire);
        assert_eq!(peer.node_type, NodeType::Invalid);
        assert_eq!(peer.id, 9);
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let config = NodeConfig::builder()
            .node_id(1)
            .identity(b"cert".to_vec(), b"super-secret-key".to_vec())
            .build();

        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("super-secret-key"));
        assert_eq!(config.key(), b"super-secret-key");
    }
}
