use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-agent-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "devices": {
            "connected": metrics.connected_devices
        },
        "pipeline": {
            "busy": state.guard.is_held(),
            "runs": metrics.pipeline_runs,
            "failures": metrics.pipeline_failures
        },
        "memory": read_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "gateway": {
            "connected_devices": metrics.connected_devices,
            "wake_detections": metrics.wake_detections,
            "wake_rejections": metrics.wake_rejections,
            "pipeline_runs": metrics.pipeline_runs,
            "pipeline_failures": metrics.pipeline_failures,
            "audio_bytes_received": metrics.audio_bytes_received,
            "audio_bytes_streamed": metrics.audio_bytes_streamed,
            "pipeline_busy": state.guard.is_held(),
            "history_turns": state.history.len()
        },
        "memory": read_memory_info()
    }))
}

/// Process memory usage as reported by the OS, when available.
#[derive(Debug, Default, Serialize)]
struct MemoryInfo {
    resident_bytes: u64,
    virtual_bytes: u64,
    available: bool,
}

fn read_memory_info() -> MemoryInfo {
    #[cfg(target_os = "linux")]
    if let Ok(status) =
        std::fs::read_to_string(format!("/proc/{}/status", std::process::id()))
    {
        let mut info = MemoryInfo {
            available: true,
            ..MemoryInfo::default()
        };
        for line in status.lines() {
            match line.split_once(':') {
                Some(("VmRSS", value)) => info.resident_bytes = parse_kb_field(value),
                Some(("VmSize", value)) => info.virtual_bytes = parse_kb_field(value),
                _ => {}
            }
        }
        return info;
    }

    MemoryInfo::default()
}

/// Parse a `/proc/<pid>/status` value like `"  123 kB"` into bytes.
#[cfg(target_os = "linux")]
fn parse_kb_field(value: &str) -> u64 {
    value
        .split_whitespace()
        .next()
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kb_field() {
        assert_eq!(parse_kb_field("\t  123 kB"), 125_952);
        assert_eq!(parse_kb_field(" not-a-number"), 0);
    }

    #[test]
    fn test_memory_probe_reads_own_process() {
        let info = read_memory_info();
        assert!(info.available);
        assert!(info.resident_bytes > 0);
    }
}
