//! Memory estimates for pre-roll buffers.

use nvr_models::CodecParams;

const MIN_STREAM_BYTES: usize = 2 * 1024 * 1024;
const MIN_TOTAL_BYTES: usize = 16 * 1024 * 1024;
const MAX_TOTAL_BYTES: usize = 512 * 1024 * 1024;

/// Estimate the bytes a stream's pre-roll buffer needs for `seconds` of
/// video, assuming roughly 0.1 bits per pixel plus audio and container
/// overhead, with 25% headroom.
pub fn estimate_stream_bytes(codec: &CodecParams, seconds: u32) -> usize {
    let pixels_per_sec = codec.width as f64 * codec.height as f64 * codec.fps.max(1) as f64;
    let bytes_per_sec = pixels_per_sec * 0.1 / 8.0 + 8000.0;
    let estimate = (bytes_per_sec * seconds as f64 * 1.25) as usize;
    estimate.max(MIN_STREAM_BYTES)
}

/// Estimate the combined budget for a set of `(codec, seconds)` buffers,
/// with 20% headroom, clamped to 16..512 MiB.
pub fn estimate_total_bytes(streams: &[(CodecParams, u32)]) -> usize {
    let sum: usize = streams
        .iter()
        .map(|(codec, seconds)| estimate_stream_bytes(codec, *seconds))
        .sum();
    ((sum as f64 * 1.2) as usize).clamp(MIN_TOTAL_BYTES, MAX_TOTAL_BYTES)
}
