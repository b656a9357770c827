//! Tee Client - configuration bootstrap and signing clients for trusted execution nodes
//!
//! An application node uses this crate in two steps: resolve its identity and
//! peers from the configuration service, then sign messages on the trusted
//! execution node over mutually authenticated TLS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  plaintext gRPC   ┌───────────────────────┐
//! │  ConfigClient    │ ────────────────► │ Configuration service │
//! └────────┬─────────┘  GetNodeInfo,     └───────────────────────┘
//!          │            GetPeerNode
//!          │ NodeConfig
//!          ▼
//! ┌──────────────────┐    mTLS gRPC      ┌───────────────────────┐
//! │   TaskClient     │ ────────────────► │ Trusted execution node│
//! └──────────────────┘    Sign (retry)   └───────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`bootstrap`] - Bootstrap configuration client
//! - [`task`] - Signing client and its connection lifecycle
//! - [`node_config`] - Resolved configuration value and peer selection
//! - [`mtls`] - Client TLS material for the signing channel
//! - [`retry`] - Declarative retry policy for transient failures
//! - [`context`] - Cancellable, deadline-bearing call context
//! - [`settings`] - Environment-driven client settings
//! - [`telemetry`] - Tracing subscriber setup
//! - [`proto`] - gRPC protocol definitions
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use tee_client::{CallContext, ClientMtlsConfig, ConfigClient, TaskClient};
//! use tee_client::proto::{Curve, Protocol};
//!
//! let ctx = CallContext::background();
//! let config = ConfigClient::new("10.0.0.5:9000").get_config(&ctx).await?;
//!
//! let tls = ClientMtlsConfig::from_node_config(&config, "tee.internal")?;
//! let mut client = TaskClient::new(config);
//! client.connect(&ctx, &tls).await?;
//!
//! let signature = client
//!     .sign(&ctx, b"payload", &public_key, Protocol::Ecdsa, Curve::Secp256k1)
//!     .await?;
//! client.close()?;
//! ```

#![deny(missing_docs)]

use std::time::Duration;

pub mod bootstrap;
pub mod context;
pub mod error;
pub mod mtls;
pub mod node_config;
pub mod proto;
pub mod retry;
pub mod settings;
pub mod task;
pub mod telemetry;

pub use bootstrap::ConfigClient;
pub use context::CallContext;
pub use error::{ConnectionCause, Error};
pub use mtls::{ClientMtlsConfig, MtlsError};
pub use node_config::{NodeConfig, NodeConfigBuilder, Peer, PeerSelection};
pub use retry::RetryPolicy;
pub use settings::{ClientSettings, EnvConfig, OsEnvConfig};
pub use task::{ClientState, TaskClient};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default sub-deadline for `get_config` and `sign` calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for establishing a channel
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
