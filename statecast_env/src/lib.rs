//! statecast Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the replication code run
//! both as a real process (tokio clock, TCP streams) and inside the
//! deterministic simulation harness (virtual clock, in-memory network).
//!
//! Two things are intercepted:
//! - Time (`now()`, `sleep()`)
//! - Network (`broadcast()`, `try_recv()`)
//!
//! # Example
//!
//! ```ignore
//! use statecast_env::{NodeContext, NetworkTransport};
//!
//! async fn render_loop<Ctx: NodeContext, Net: NetworkTransport>(ctx: &Ctx, net: &Net) {
//!     loop {
//!         while let Some((_, frame)) = net.try_recv() {
//!             apply(frame);
//!         }
//!         ctx.sleep(Duration::from_millis(16)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
mod tcp;

pub use context::NodeContext;
pub use network::{NetworkTransport, NetworkController};
pub use types::{NodeId, FrameEnvelope};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use tcp::TcpTransport;
