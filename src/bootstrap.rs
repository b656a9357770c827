//! Bootstrap configuration client
//!
//! Resolves this node's [`NodeConfig`] from the configuration service over a
//! plaintext channel. The bootstrap channel is only trusted to hand out the
//! certificates that secure every later connection.
//!
//! # Resolution Flow
//!
//! 1. Open a transient channel to the configuration service
//! 2. `GetNodeInfo`: node id, certificate and private key
//! 3. `GetPeerNode`: peer list, scanned once for the first trusted execution
//!    peer and the first application peer
//! 4. Drop the channel, whatever the outcome

use std::time::Duration;

use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, instrument, warn};

use crate::context::{request_with_deadline, CallContext};
use crate::node_config::{NodeConfig, Peer, PeerSelection};
use crate::proto::config::config_service_client::ConfigServiceClient;
use crate::proto::config::{GetNodeInfoRequest, GetPeerNodeRequest};
use crate::{Error, Result, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};

/// Client for the plaintext configuration service
///
/// Construction performs no network activity; each [`get_config`] call opens
/// and releases its own channel.
///
/// [`get_config`]: ConfigClient::get_config
#[derive(Clone, Debug)]
pub struct ConfigClient {
    server_address: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl ConfigClient {
    /// Create a client for the configuration service at `server_address`
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Limit how long establishing the bootstrap channel may take
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Override the sub-deadline applied to subsequent `get_config` calls
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sub-deadline applied to each `get_config` call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Configured configuration service address
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// Resolve a fresh [`NodeConfig`]
    ///
    /// Both remote calls share one sub-deadline derived from `ctx`. Fails with
    /// [`Error::Connection`] if the channel cannot be opened and with
    /// [`Error::Configuration`] if either call fails or the peer list holds
    /// neither a trusted execution nor an application peer.
    #[instrument(skip(self, ctx), fields(address = %self.server_address))]
    pub async fn get_config(&self, ctx: &CallContext) -> Result<NodeConfig> {
        let deadline = ctx.sub_deadline(self.timeout);

        // Dropped on every return path below, which closes the connection
        let channel = self.open_channel(ctx, deadline).await?;
        let mut client = ConfigServiceClient::new(channel);

        debug!("Fetching node info");
        let node_info = ctx
            .run_until(
                deadline,
                client.get_node_info(request_with_deadline(GetNodeInfoRequest {}, deadline)),
            )
            .await
            .and_then(|response| response)
            .map_err(|status| Error::configuration_with("failed to fetch node info", status))?
            .into_inner();

        debug!(node_id = node_info.node_id, "Fetching peer nodes");
        let peers = ctx
            .run_until(
                deadline,
                client.get_peer_node(request_with_deadline(GetPeerNodeRequest {}, deadline)),
            )
            .await
            .and_then(|response| response)
            .map_err(|status| Error::configuration_with("failed to fetch peer nodes", status))?
            .into_inner()
            .peers;

        let peer_count = peers.len();
        let selection = PeerSelection::select(peers.into_iter().map(Peer::from));

        if selection.is_empty() {
            return Err(Error::configuration(format!(
                "no trusted execution or application peer among {} peers",
                peer_count
            )));
        }

        if !selection.is_complete() {
            warn!(
                trusted_execution = selection.trusted_execution().is_some(),
                application = selection.application().is_some(),
                "Only one peer type found, leaving the other empty"
            );
        }

        let config = selection
            .apply(
                NodeConfig::builder()
                    .node_id(node_info.node_id)
                    .identity(node_info.cert, node_info.key),
            )
            .build();

        info!(
            node_id = config.node_id(),
            rpc_address = %config.rpc_address(),
            app_node_addr = %config.app_node_addr(),
            "Node config resolved"
        );

        Ok(config)
    }

    async fn open_channel(&self, ctx: &CallContext, deadline: Instant) -> Result<Channel> {
        let uri = bootstrap_uri(&self.server_address);
        let endpoint = Endpoint::from_shared(uri).map_err(|e| {
            Error::connection_with(
                format!("invalid configuration service address {}", self.server_address),
                e,
            )
        })?;

        debug!("Opening bootstrap channel");
        match ctx
            .run_until(
                deadline,
                endpoint.connect_timeout(self.connect_timeout).connect(),
            )
            .await
        {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(e)) => Err(Error::connection_with(
                format!(
                    "failed to connect to configuration service at {}",
                    self.server_address
                ),
                e,
            )),
            Err(status) => Err(Error::connection_interrupted(
                format!(
                    "connecting to configuration service at {} interrupted",
                    self.server_address
                ),
                status,
            )),
        }
    }
}

/// Plaintext URI for the bootstrap channel; bare `host:port` gets `http://`
fn bootstrap_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tonic::{Code, Request, Response, Status};

    use crate::proto::config::config_service_server::{ConfigService, ConfigServiceServer};
    use crate::proto::config::{NodeInfo, PeerNodeList};
    use crate::proto::{self, NodeType};

    #[derive(Clone)]
    struct MockConfigService {
        node_info: std::result::Result<NodeInfo, Code>,
        peers: std::result::Result<Vec<proto::config::Peer>, Code>,
        delay: Duration,
    }

    impl MockConfigService {
        fn with_peers(peers: Vec<proto::config::Peer>) -> Self {
            Self {
                node_info: Ok(NodeInfo {
                    node_id: 42,
                    address: "10.0.0.42:9000".to_string(),
                    cert: b"node-cert".to_vec(),
                    key: b"node-key".to_vec(),
                }),
                peers: Ok(peers),
                delay: Duration::ZERO,
            }
        }
    }

    #[tonic::async_trait]
    impl ConfigService for MockConfigService {
        async fn get_node_info(
            &self,
            _request: Request<GetNodeInfoRequest>,
        ) -> std::result::Result<Response<NodeInfo>, Status> {
            tokio::time::sleep(self.delay).await;
            match &self.node_info {
                Ok(info) => Ok(Response::new(info.clone())),
                Err(code) => Err(Status::new(*code, "node info unavailable")),
            }
        }

        async fn get_peer_node(
            &self,
            _request: Request<GetPeerNodeRequest>,
        ) -> std::result::Result<Response<PeerNodeList>, Status> {
            match &self.peers {
                Ok(peers) => Ok(Response::new(PeerNodeList {
                    peers: peers.clone(),
                })),
                Err(code) => Err(Status::new(*code, "peer list unavailable")),
            }
        }
    }

    async fn spawn_config_server(service: MockConfigService) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(ConfigServiceServer::new(service))
                .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await
        });

        addr
    }

    fn wire_peer(id: u64, node_type: NodeType) -> proto::config::Peer {
        proto::config::Peer {
            id,
            address: format!("10.0.1.{}:7000", id),
            cert: format!("peer-cert-{}", id).into_bytes(),
            node_type: node_type.into(),
        }
    }

    #[test]
    fn construction_is_lazy_and_uses_defaults() {
        let client = ConfigClient::new("unreachable.invalid:1");
        assert_eq!(client.server_address(), "unreachable.invalid:1");
        assert_eq!(client.timeout(), DEFAULT_CALL_TIMEOUT);
    }

    #[test]
    fn set_timeout_overrides_default() {
        let mut client = ConfigClient::new("127.0.0.1:1");
        client.set_timeout(Duration::from_millis(250));
        assert_eq!(client.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn bootstrap_uri_adds_plaintext_scheme() {
        assert_eq!(bootstrap_uri("10.0.0.1:9000"), "http://10.0.0.1:9000");
        assert_eq!(bootstrap_uri("http://cfg:9000"), "http://cfg:9000");
    }

    #[tokio::test]
    async fn resolves_first_peer_of_each_type() {
        let addr = spawn_config_server(MockConfigService::with_peers(vec![
            wire_peer(1, NodeType::Mesh),
            wire_peer(2, NodeType::Application),
            wire_peer(3, NodeType::TrustedExecution),
            wire_peer(4, NodeType::Application),
            wire_peer(5, NodeType::TrustedExecution),
        ]))
        .await;

        let client = ConfigClient::new(addr.to_string());
        let config = client
            .get_config(&CallContext::background())
            .await
            .expect("config should resolve");

        assert_eq!(config.node_id(), 42);
        assert_eq!(config.cert(), b"node-cert");
        assert_eq!(config.key(), b"node-key");
        assert_eq!(config.rpc_address(), "10.0.1.3:7000");
        assert_eq!(config.target_cert(), b"peer-cert-3");
        assert_eq!(config.app_node_addr(), "10.0.1.2:7000");
        assert_eq!(config.app_node_cert(), b"peer-cert-2");
    }

    #[tokio::test]
    async fn fails_when_no_wanted_peer_is_present() {
        let addr = spawn_config_server(MockConfigService::with_peers(vec![
            wire_peer(1, NodeType::Mesh),
            wire_peer(2, NodeType::Invalid),
        ]))
        .await;

        let result = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await;

        match result {
            Err(Error::Configuration { message, source }) => {
                assert!(message.contains("2 peers"));
                assert!(source.is_none());
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fails_on_empty_peer_list() {
        let addr = spawn_config_server(MockConfigService::with_peers(Vec::new())).await;

        let result = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await;

        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[tokio::test]
    async fn succeeds_with_only_trusted_execution_peer() {
        let addr = spawn_config_server(MockConfigService::with_peers(vec![wire_peer(
            3,
            NodeType::TrustedExecution,
        )]))
        .await;

        let config = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await
            .expect("one peer type is enough");

        assert_eq!(config.rpc_address(), "10.0.1.3:7000");
        assert!(config.app_node_addr().is_empty());
        assert!(config.app_node_cert().is_empty());
    }

    #[tokio::test]
    async fn succeeds_with_only_application_peer() {
        let addr = spawn_config_server(MockConfigService::with_peers(vec![wire_peer(
            2,
            NodeType::Application,
        )]))
        .await;

        let config = ConfigClient::new(format!("http://{}", addr))
            .get_config(&CallContext::background())
            .await
            .expect("one peer type is enough");

        assert_eq!(config.app_node_addr(), "10.0.1.2:7000");
        assert!(config.rpc_address().is_empty());
        assert!(config.target_cert().is_empty());
    }

    #[tokio::test]
    async fn node_info_failure_is_a_configuration_error() {
        let mut service = MockConfigService::with_peers(vec![wire_peer(
            1,
            NodeType::TrustedExecution,
        )]);
        service.node_info = Err(Code::PermissionDenied);
        let addr = spawn_config_server(service).await;

        let err = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(err.status_code(), Some(Code::PermissionDenied));
        assert!(err.to_string().contains("node info"));
    }

    #[tokio::test]
    async fn peer_list_failure_is_a_configuration_error() {
        let mut service = MockConfigService::with_peers(Vec::new());
        service.peers = Err(Code::Internal);
        let addr = spawn_config_server(service).await;

        let err = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(err.status_code(), Some(Code::Internal));
        assert!(err.to_string().contains("peer nodes"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        // Reserve a port, then free it so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ConfigClient::new(addr.to_string())
            .get_config(&CallContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connection { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn invalid_address_is_a_connection_error() {
        let err = ConfigClient::new("http://bad address with spaces")
            .get_config(&CallContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connection { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn cancelled_context_interrupts_dial() {
        let ctx = CallContext::background();
        ctx.cancel();

        let err = ConfigClient::new("127.0.0.1:1")
            .get_config(&ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connection { .. }), "{:?}", err);
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn slow_server_hits_sub_deadline() {
        let mut service = MockConfigService::with_peers(Vec::new());
        service.delay = Duration::from_secs(30);
        let addr = spawn_config_server(service).await;

        let mut client = ConfigClient::new(addr.to_string());
        client.set_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = client
            .get_config(&CallContext::background())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(err.status_code(), Some(Code::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancelling_parent_context_stops_resolution() {
        let mut service = MockConfigService::with_peers(Vec::new());
        service.delay = Duration::from_secs(30);
        let addr = spawn_config_server(service).await;

        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = ConfigClient::new(addr.to_string())
            .get_config(&ctx)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.status_code(), Some(Code::Cancelled));
    }
}
