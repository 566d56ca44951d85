//! Statecast Core - Single-Producer State Replication
//!
//! One producer node owns a small simulation record (time, rotation, tick
//! counter) plus a procedurally generated RGB payload, and replicates the
//! whole record every frame to any number of passive consumer nodes:
//! 1. **Record**: fixed-size binary layout, identical on every node
//! 2. **Field**: deterministic payload from the record's scalars
//! 3. **Replication**: newest-frame-wins, never regresses, never blocks
//! 4. **Change detection**: tick counter gates GPU uploads
//! 5. **Trajectory**: chaotic attractor polylines for the overlay

pub mod change;
pub mod field;
pub mod node;
pub mod params;
pub mod record;
pub mod replication;
pub mod role;
pub mod sink;
pub mod trajectory;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use change::{Change, ChangeDetector};
pub use node::{Consumer, ControlCommand, Producer, ReplicaNode, SessionConfig};
pub use params::{ParamError, Preset, PresetBank, TrajectoryParams};
pub use record::{RecordError, Resolution, StateRecord};
pub use replication::{ChannelStats, ReplicationChannel};
pub use role::{Role, RoleConfig, RoleCoordinator, SessionError};
pub use sink::{GeometrySink, PixelFormat, TextureSink};
pub use trajectory::{TrajectoryIntegrator, Variant};
