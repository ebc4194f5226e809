// ABOUTME: Remote command execution engine.
// ABOUTME: Runs commands on one or many hosts in parallel with prefixed, streamed output.

mod address;
mod command;
mod demux;
mod error;
mod group;
mod host;
mod process;
mod sink;

pub use address::parse_deployment_address;
pub use command::{Command, CommandResult, RunOptions, quote};
pub use demux::{CHUNK_SIZE, Channel, DemuxOutput, Demultiplexer, OutputMode, STALL_WINDOW};
pub use error::{Error, Result};
pub use group::{HostGroup, HostResult, check_results};
pub use host::{Host, HostKeyCheck, HostMeta};
pub use sink::{MemorySink, OutputSink, SinkLine, TracingSink};
