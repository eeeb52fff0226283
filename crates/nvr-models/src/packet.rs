//! Encoded packets and codec parameters handed over by the transport layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Codec parameters of a stream's video track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodecParams {
    /// Codec name as understood by FFmpeg (e.g. "h264", "hevc")
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Out-of-band codec configuration (SPS/PPS), empty for Annex-B streams
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extradata: Vec<u8>,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            codec: "h264".to_string(),
            width: 1280,
            height: 720,
            fps: 15,
            extradata: Vec::new(),
        }
    }
}

/// An encoded video packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    /// Presentation timestamp in milliseconds
    pub pts_ms: i64,
    pub keyframe: bool,
}

impl EncodedPacket {
    pub fn new(data: Vec<u8>, pts_ms: i64, keyframe: bool) -> Self {
        Self {
            data,
            pts_ms,
            keyframe,
        }
    }
}

/// A packet held by the circular pre-roll buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBufferEntry {
    pub data: Vec<u8>,
    /// Presentation timestamp in milliseconds
    pub pts_ms: i64,
    pub keyframe: bool,
    /// Stream-relative sequence number
    pub sequence: u64,
}

impl PacketBufferEntry {
    pub fn from_packet(packet: EncodedPacket, sequence: u64) -> Self {
        Self {
            data: packet.data,
            pts_ms: packet.pts_ms,
            keyframe: packet.keyframe,
            sequence,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
