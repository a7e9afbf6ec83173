//! Managed Service for Apache Kafka: clusters and topics

mod cluster;
mod topic;

pub use cluster::{
    AccessConfig, CapacityConfig, Cluster, ClusterState, GcpConfig, NetworkConfig, RebalanceConfig,
};
pub use topic::{Topic, TopicState};
