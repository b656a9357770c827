//! Task client for the trusted execution node
//!
//! Holds one mutually authenticated channel to the trusted execution peer
//! named in a [`NodeConfig`] and issues signing calls over it.
//!
//! # Lifecycle
//!
//! ```text
//! Unconnected ──connect──► Connected ──close──► Closed
//!      ▲                      │  ▲                 │
//!      └──connect failed──────┘  └─────connect─────┘
//! ```
//!
//! Each `sign` call gets its own sub-deadline and is retried on transient
//! transport failures according to the client's [`RetryPolicy`].

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, instrument, warn};

use crate::context::{request_with_deadline, CallContext};
use crate::mtls::ClientMtlsConfig;
use crate::node_config::NodeConfig;
use crate::proto::task::task_service_client::TaskServiceClient;
use crate::proto::task::SignRequest;
use crate::proto::{Curve, Protocol};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{Error, Result, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};

/// Task client connection state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No connection has been established (or the last attempt failed)
    Unconnected,
    /// Connected to the trusted execution node
    Connected,
    /// Connection released by `close`
    Closed,
}

/// Signing client for the trusted execution node
///
/// `sign` borrows the client immutably so concurrent calls can share one
/// channel. `connect` and `close` need exclusive access.
pub struct TaskClient {
    config: NodeConfig,
    client: Option<TaskServiceClient<Channel>>,
    state: ClientState,
    timeout: Duration,
    connect_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl TaskClient {
    /// Create an unconnected client for the peer named in `config`
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            client: None,
            state: ClientState::Unconnected,
            timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used by `sign`
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Limit how long establishing the channel may take
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Override the sub-deadline applied to subsequent `sign` calls
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sub-deadline applied to each `sign` call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current connection state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Configuration this client was built from
    pub fn node_config(&self) -> &NodeConfig {
        &self.config
    }

    /// Retry policy applied to `sign`
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Open the mTLS channel to the trusted execution node
    ///
    /// Any existing connection is released first. A peer address carrying a
    /// scheme other than `https` is refused. On failure the client is left
    /// `Unconnected` and an [`Error::Connection`] is returned.
    #[instrument(skip(self, ctx, tls), fields(address = %self.config.rpc_address()))]
    pub async fn connect(&mut self, ctx: &CallContext, tls: &ClientMtlsConfig) -> Result<()> {
        self.release();

        let endpoint = self
            .endpoint("https")?
            .tls_config(tls.to_tonic_config())
            .map_err(|e| Error::connection_with("invalid TLS configuration", e))?;

        self.establish(ctx, endpoint).await
    }

    /// Open a plaintext channel (tests only)
    #[cfg(test)]
    pub(crate) async fn connect_insecure(&mut self, ctx: &CallContext) -> Result<()> {
        self.release();
        let endpoint = self.endpoint("http")?;
        self.establish(ctx, endpoint).await
    }

    /// Sign `message` with the key referenced by `public_key`
    ///
    /// Fails fast with [`Error::NotConnected`] or [`Error::InvalidArgument`]
    /// without touching the network. A transport failure that survives the
    /// retry policy is returned as [`Error::Transport`]; a response with
    /// `success = false` as [`Error::Signing`].
    #[instrument(
        skip_all,
        fields(
            node_id = self.config.node_id(),
            protocol = ?protocol,
            curve = ?curve,
            message_len = message.len()
        )
    )]
    pub async fn sign(
        &self,
        ctx: &CallContext,
        message: &[u8],
        public_key: &[u8],
        protocol: Protocol,
        curve: Curve,
    ) -> Result<Vec<u8>> {
        let client = match (&self.client, self.state) {
            (Some(client), ClientState::Connected) => client.clone(),
            _ => return Err(Error::NotConnected),
        };

        if message.is_empty() {
            return Err(Error::invalid_argument("message must not be empty"));
        }
        if public_key.is_empty() {
            return Err(Error::invalid_argument("public key must not be empty"));
        }

        let request = SignRequest {
            from: self.config.node_id(),
            public_key_info: public_key.to_vec(),
            message: message.to_vec(),
            protocol: protocol.into(),
            curve: curve.into(),
        };

        let deadline = ctx.sub_deadline(self.timeout);
        let response = ctx
            .run_until(
                deadline,
                retry_with_backoff(&self.retry_policy, "sign", || {
                    let mut client = client.clone();
                    let request = request_with_deadline(request.clone(), deadline);
                    async move { client.sign(request).await }
                }),
            )
            .await
            .and_then(|response| response)
            .map_err(|status| Error::transport("sign", status))?
            .into_inner();

        if !response.success {
            let reason = if response.error.is_empty() {
                "signing service reported failure without a reason".to_string()
            } else {
                response.error
            };
            warn!(error = %reason, "Signing request rejected");
            return Err(Error::signing(reason));
        }

        debug!(signature_len = response.signature.len(), "Message signed");
        Ok(response.signature)
    }

    /// Release the connection
    ///
    /// Closing an unconnected or already closed client does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            self.state = ClientState::Closed;
            info!(address = %self.config.rpc_address(), "Task client closed");
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.client.take().is_some() {
            info!(address = %self.config.rpc_address(), "Releasing existing connection");
        }
        self.state = ClientState::Unconnected;
    }

    fn endpoint(&self, scheme: &str) -> Result<Endpoint> {
        let address = self.config.rpc_address();
        if address.is_empty() {
            return Err(Error::connection(
                "node config has no trusted execution peer address",
            ));
        }

        let uri = match address.split_once("://") {
            Some((given, _)) if given == scheme => address.to_string(),
            Some((given, _)) => {
                return Err(Error::connection(format!(
                    "trusted execution peer address {} uses scheme {}, expected {}",
                    address, given, scheme
                )))
            }
            None => format!("{}://{}", scheme, address),
        };

        Endpoint::from_shared(uri)
            .map(|endpoint| endpoint.connect_timeout(self.connect_timeout))
            .map_err(|e| {
                Error::connection_with(
                    format!("invalid trusted execution peer address {}", address),
                    e,
                )
            })
    }

    async fn establish(&mut self, ctx: &CallContext, endpoint: Endpoint) -> Result<()> {
        let address = self.config.rpc_address().to_string();
        debug!(address = %address, "Connecting to trusted execution node");

        let channel = match ctx.run(self.connect_timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                return Err(Error::connection_with(
                    format!("failed to connect to trusted execution node at {}", address),
                    e,
                ))
            }
            Err(status) => {
                return Err(Error::connection_interrupted(
                    format!("connecting to trusted execution node at {} interrupted", address),
                    status,
                ))
            }
        };

        self.client = Some(TaskServiceClient::new(channel));
        self.state = ClientState::Connected;
        info!(address = %address, "Connected to trusted execution node");
        Ok(())
    }
}

impl std::fmt::Debug for TaskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskClient")
            .field("node_id", &self.config.node_id())
            .field("rpc_address", &self.config.rpc_address())
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
