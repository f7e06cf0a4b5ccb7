//! Agent-facing side of the proxy.
//!
//! - `codec`: NDJSON framing shared by every stream the proxy touches.
//! - `channel`: the [`AgentChannel`](channel::AgentChannel) /
//!   [`AgentSpawner`](channel::AgentSpawner) seam to whatever runs agents.
//! - `spawner`: the default spawner, launching agents as local processes.
//! - `writer`: per-session task owning the write half of a channel.
//! - `reader`: per-session loop consuming agent output.

pub mod channel;
pub mod codec;
pub mod reader;
pub mod spawner;
pub mod writer;
