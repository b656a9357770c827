//! gRPC protocol definitions for the configuration and signing services
//!
//! This module contains the generated Protobuf and gRPC code for both remote
//! services this library talks to.
//!
//! # Protocol Overview
//!
//! - `config::v1::ConfigService`: plaintext bootstrap service returning this
//!   node's identity (`GetNodeInfo`) and the known peers (`GetPeerNode`).
//! - `task::v1::TaskService`: mTLS-only signing service hosted by the trusted
//!   execution node (`Sign`).
//!
//! # Example
//!
//! ```ignore
//! use tee_client::proto::config::config_service_client::ConfigServiceClient;
//! use tee_client::proto::config::GetNodeInfoRequest;
//!
//! let mut client = ConfigServiceClient::connect("http://10.0.0.5:9000").await?;
//! let info = client.get_node_info(GetNodeInfoRequest {}).await?.into_inner();
//! ```

#![allow(missing_docs)] // Generated code doesn't have docs
#![allow(clippy::doc_overindented_list_items)] // Generated proto docs have formatting issues

/// Generated code for the bootstrap configuration service
pub mod config {
    tonic::include_proto!("teeclient.config.v1");
}

/// Generated code for the signing service
pub mod task {
    tonic::include_proto!("teeclient.task.v1");
}

pub use config::NodeType;
pub use task::{Curve, Protocol};
