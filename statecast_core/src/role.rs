//! Producer/consumer role assignment.
//!
//! Roles are fixed at process start from configuration and never elected at
//! runtime. Exactly one node per session produces; everything else consumes.

use crate::record::RecordError;
use statecast_env::{EnvError, NodeId};
use thiserror::Error;
use tracing::info;

/// Session-level failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The designated producer is not part of the session
    #[error("No producer: designated node {0} is not in the session")]
    NoProducer(String),

    /// The replication channel could not be established
    #[error("Replication channel failed: {0}")]
    Channel(#[from] EnvError),

    /// Bad record configuration (e.g. zero resolution)
    #[error("Invalid record configuration: {0}")]
    Record(#[from] RecordError),
}

/// What a node does in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Owns and mutates the record, publishes it
    Producer,
    /// Receives and displays, never mutates
    Consumer,
}

impl Role {
    pub fn is_producer(self) -> bool {
        self == Role::Producer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Producer => write!(f, "PRODUCER"),
            Role::Consumer => write!(f, "CONSUMER"),
        }
    }
}

/// Environment-level role settings, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleConfig {
    /// This node's identity
    pub node_name: String,

    /// Explicit primary flag, if set
    pub primary_flag: Option<bool>,

    /// Identity of the designated producer, if set
    pub designated: Option<String>,
}

impl RoleConfig {
    /// Node identity variable.
    pub const NODE_VAR: &'static str = "STATECAST_NODE";
    /// Truthy flag marking this node as the producer.
    pub const PRIMARY_VAR: &'static str = "STATECAST_PRIMARY";
    /// Identity of the designated producer.
    pub const PRIMARY_NODE_VAR: &'static str = "STATECAST_PRIMARY_NODE";

    /// Reads the role variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the role variables through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            node_name: lookup(Self::NODE_VAR).unwrap_or_else(|| "node".to_string()),
            primary_flag: lookup(Self::PRIMARY_VAR).map(|v| is_truthy(&v)),
            designated: lookup(Self::PRIMARY_NODE_VAR),
        }
    }

    /// Decides the role.
    ///
    /// The explicit flag wins; otherwise the node produces iff it is the
    /// designated node. With neither set the node runs standalone as producer.
    pub fn role(&self) -> Role {
        match (self.primary_flag, &self.designated) {
            (Some(true), _) => Role::Producer,
            (Some(false), _) => Role::Consumer,
            (None, Some(designated)) if *designated == self.node_name => Role::Producer,
            (None, Some(_)) => Role::Consumer,
            (None, None) => Role::Producer,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "primary"
    )
}

/// Holds the role decided at startup.
#[derive(Debug, Clone)]
pub struct RoleCoordinator {
    config: RoleConfig,
    role: Role,
}

impl RoleCoordinator {
    /// Decides the role from a configuration.
    pub fn new(config: RoleConfig) -> Self {
        let role = config.role();
        info!("Node '{}' started as: {}", config.node_name, role);
        Self { config, role }
    }

    /// Decides the role from the process environment.
    pub fn from_env() -> Self {
        Self::new(RoleConfig::from_env())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }
}

/// Assigns roles for an in-process session: `designated` produces, the rest consume.
pub fn assign_roles(
    nodes: &[NodeId],
    designated: NodeId,
) -> Result<Vec<(NodeId, Role)>, SessionError> {
    if !nodes.contains(&designated) {
        return Err(SessionError::NoProducer(designated.to_string()));
    }
    Ok(nodes
        .iter()
        .map(|&id| {
            let role = if id == designated { Role::Producer } else { Role::Consumer };
            (id, role)
        })
        .collect())
}
