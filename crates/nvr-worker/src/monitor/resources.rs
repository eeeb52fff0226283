//! Memory-aware downscale selection.

use nvr_models::ModelType;

/// Downscale factor applied when available memory is below the low-memory
/// threshold.
pub const LOW_MEMORY_DOWNSCALE: u32 = 4;

/// Available system memory in MiB, from `/proc/meminfo`.
///
/// `None` on platforms without procfs.
pub fn available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

/// Pick the frame downscale factor for a model.
pub fn downscale_for(model_type: ModelType, available_mb: Option<u64>, low_memory_mb: u64) -> u32 {
    match available_mb {
        Some(mb) if mb < low_memory_mb => LOW_MEMORY_DOWNSCALE,
        _ => model_type.downscale_factor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem_available() {
        let meminfo = "MemTotal:        2048000 kB\nMemFree:          100000 kB\nMemAvailable:     512000 kB\n";
        assert_eq!(parse_mem_available(meminfo), Some(500));
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn test_downscale_for() {
        assert_eq!(downscale_for(ModelType::Onnx, Some(1024), 50), 1);
        assert_eq!(downscale_for(ModelType::Sod, Some(1024), 50), 2);
        assert_eq!(downscale_for(ModelType::Onnx, Some(32), 50), LOW_MEMORY_DOWNSCALE);
        assert_eq!(downscale_for(ModelType::Sod, None, 50), 2);
    }
}
