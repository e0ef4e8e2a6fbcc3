//! Error types for cluster configuration.

/// Errors raised while assembling a node's cluster configuration.
///
/// These all surface at construction time; a running node never returns
/// them.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The cluster must contain at least one member.
    #[error("cluster size must be at least 1")]
    InvalidClusterSize,

    /// A seed entry could not be parsed as `uuid@host:port`.
    #[error("invalid seed '{0}', expected uuid@host:port")]
    InvalidSeed(String),
}
