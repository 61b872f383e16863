//! Prometheus text exporter for oven-score
//!
//! Endpoint: GET /metrics (on the web port, default 8090)

use std::fmt::Write;

use crate::cache::CacheStats;
use crate::score::engine::ScoreEngine;

/// Generate Prometheus-format metrics text
pub fn render_metrics(engine: &ScoreEngine) -> String {
    let mut out = String::with_capacity(4096);

    // ──────────────────────────────────────────────
    // Process
    // ──────────────────────────────────────────────
    write_help_type(&mut out, "oven_up", "Whether the scoring service is up.", "gauge");
    writeln!(out, "oven_up 1").ok();

    write_help_type(&mut out, "oven_uptime_seconds_total", "Uptime since process start in seconds.", "counter");
    writeln!(out, "oven_uptime_seconds_total {:.3}", engine.start_time.elapsed().as_secs_f64()).ok();

    // ──────────────────────────────────────────────
    // Clicks
    // ──────────────────────────────────────────────
    write_help_type(&mut out, "oven_clicks_total", "Link-follow events by outcome.", "counter");
    writeln!(out, "oven_clicks_total{{result=\"recorded\"}} {}", engine.clicks.recorded()).ok();
    write_counter_if_nonzero(&mut out, "oven_clicks_total", "result", "not_found", engine.clicks.not_found());
    write_counter_if_nonzero(&mut out, "oven_clicks_total", "result", "failed", engine.clicks.failed());

    // ──────────────────────────────────────────────
    // Decay
    // ──────────────────────────────────────────────
    write_help_type(&mut out, "oven_decay_ticks_total", "Scheduled decay ticks attempted.", "counter");
    writeln!(out, "oven_decay_ticks_total {}", engine.history.total_recorded()).ok();

    write_help_type(&mut out, "oven_decay_tick_failures_total", "Decay ticks that could not list products.", "counter");
    writeln!(out, "oven_decay_tick_failures_total {}", engine.history.total_failed()).ok();

    if let Some(report) = engine.history.last().and_then(|r| r.report) {
        write_help_type(&mut out, "oven_decay_last_products", "Products handled by the last decay tick, by outcome.", "gauge");
        writeln!(out, "oven_decay_last_products{{result=\"updated\"}} {}", report.updated).ok();
        writeln!(out, "oven_decay_last_products{{result=\"failed\"}} {}", report.failed).ok();
        writeln!(out, "oven_decay_last_products{{result=\"skipped\"}} {}", report.skipped).ok();

        write_help_type(&mut out, "oven_decay_last_duration_seconds", "Wall time of the last decay tick.", "gauge");
        writeln!(out, "oven_decay_last_duration_seconds {:.3}", report.elapsed_ms as f64 / 1000.0).ok();
    }

    if let Some(day) = engine.ledger.last_tick() {
        write_help_type(&mut out, "oven_decay_last_tick_info", "Calendar day of the last completed decay tick.", "gauge");
        writeln!(out, "oven_decay_last_tick_info{{day=\"{}\"}} 1", day).ok();
    }

    // ──────────────────────────────────────────────
    // Entity cache
    // ──────────────────────────────────────────────
    let kinds: [(&str, CacheStats); 2] = [
        ("tag", engine.references.tags.stats()),
        ("merchant", engine.references.merchants.stats()),
    ];

    write_help_type(&mut out, "oven_entity_cache_entries", "Hydrated entries in the entity cache.", "gauge");
    for (kind, stats) in &kinds {
        writeln!(out, "oven_entity_cache_entries{{kind=\"{}\"}} {}", kind, stats.entries).ok();
    }
    write_help_type(&mut out, "oven_entity_cache_hits_total", "Entity cache lookups served from memory.", "counter");
    for (kind, stats) in &kinds {
        writeln!(out, "oven_entity_cache_hits_total{{kind=\"{}\"}} {}", kind, stats.hits).ok();
    }
    write_help_type(&mut out, "oven_entity_cache_misses_total", "Entity cache lookups that read the store.", "counter");
    for (kind, stats) in &kinds {
        writeln!(out, "oven_entity_cache_misses_total{{kind=\"{}\"}} {}", kind, stats.misses).ok();
    }
    write_help_type(&mut out, "oven_entity_cache_load_failures_total", "Store reads on a miss that failed.", "counter");
    for (kind, stats) in &kinds {
        write_counter_if_nonzero(&mut out, "oven_entity_cache_load_failures_total", "kind", kind, stats.load_failures);
    }

    // ──────────────────────────────────────────────
    // Build info
    // ──────────────────────────────────────────────
    write_help_type(&mut out, "oven_build_info", "oven-score build information.", "gauge");
    writeln!(out, "oven_build_info{{version=\"{}\"}} 1", env!("CARGO_PKG_VERSION")).ok();

    out
}

// ── helpers ─────────────────────────────────────────

fn write_help_type(out: &mut String, name: &str, help: &str, metric_type: &str) {
    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();
}

fn write_counter_if_nonzero(out: &mut String, name: &str, label: &str, value: &str, count: u64) {
    if count > 0 {
        writeln!(out, "{}{{{}=\"{}\"}} {}", name, label, value, count).ok();
    }
}
