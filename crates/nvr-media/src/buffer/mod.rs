//! Pre-roll packet buffering.

mod memory;
mod packet_buffer;

pub use memory::{estimate_stream_bytes, estimate_total_bytes};
pub use packet_buffer::{
    BufferStats, PacketBuffer, DEFAULT_PRE_BUFFER_SECS, MAX_PRE_BUFFER_SECS, MIN_PRE_BUFFER_SECS,
};
