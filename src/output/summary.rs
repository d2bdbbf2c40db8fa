//! Plain-text summary of a report for the terminal.

use crate::aggregator::metrics::top_classes;
use crate::parser::schema::{Report, ThreadReport};
use crate::parser::record::ThreadKey;

/// Render a per-thread summary table
///
/// **Public** - printed by `analyze --summary`
///
/// # Arguments
/// * `report` - Report to summarize
/// * `max_classes` - Number of most requested size classes listed per thread
pub fn generate_text_summary(report: &Report, max_classes: usize) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "  Trace: {} ({} records, {} threads)",
        report.trace_file,
        report.record_count,
        report.threads.len()
    ));

    for (key, thread) in &report.threads {
        lines.push(String::new());
        render_thread(&mut lines, key, thread, max_classes);
    }

    lines.push(String::new());
    if report.total_diagnostics() == 0 {
        lines.push("  No inconsistencies found".to_string());
    } else {
        lines.push(format!(
            "  Diagnostics: {} block-not-found, {} duplicate-block",
            report.diagnostics.block_not_found, report.diagnostics.duplicate_block
        ));
        for entry in report.diagnostics.entries.iter().take(5) {
            lines.push(format!("    [{}] {}", entry.thread, entry.diagnostic));
        }
        if report.diagnostics.truncated || report.diagnostics.entries.len() > 5 {
            lines.push("    ...".to_string());
        }
    }

    lines.join("\n")
}

fn render_thread(lines: &mut Vec<String>, key: &ThreadKey, thread: &ThreadReport, max_classes: usize) {
    let stats = &thread.stats;
    let events = &stats.events;

    lines.push(format!(
        "  THREAD {}  malloc {} | free {} | realloc {} | memalign {} | last event @{} ms",
        key, events.malloc, events.free, events.realloc, events.memalign, stats.last_event_ms
    ));
    lines.push("  ┏━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━┓".to_string());
    lines.push(format!(
        "  ┃ {:<14} ┃ {:^21} ┃ {:^21} ┃ {:^12} ┃",
        "Tier (cumul.)", "PEAK BYTES @ms", "PEAK BLOCKS @ms", "FINAL BYTES"
    ));
    lines.push("  ┣━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━━━┫".to_string());

    for tier in &stats.tiers {
        lines.push(format!(
            "  ┃ {:<14} ┃ {:>12} @{:<8} ┃ {:>12} @{:<8} ┃ {:>12} ┃",
            tier.label,
            tier.peak_bytes,
            tier.peak_bytes_at,
            tier.peak_count,
            tier.peak_count_at,
            tier.final_bytes
        ));
    }

    lines.push("  ┗━━━━━━━━━━━━━━━━┻━━━━━━━━━━━━━━━━━━━━━━━┻━━━━━━━━━━━━━━━━━━━━━━━┻━━━━━━━━━━━━━━┛".to_string());

    if stats.residual_blocks > 0 {
        lines.push(format!("  {} blocks never freed", stats.residual_blocks));
    }

    let top = top_classes(&thread.histogram, max_classes);
    if top.is_empty() {
        lines.push("  (no malloc requests)".to_string());
        return;
    }

    let largest = top.first().map(|&(_, count)| count).unwrap_or(1).max(1);
    lines.push(format!("  Top {} size classes:", top.len()));
    for (size, count) in top {
        let bar_width = ((count as f64 / largest as f64) * 40.0).ceil() as usize;
        lines.push(format!(
            "    {:>10} B {:>10}  {}",
            size,
            count,
            "█".repeat(bar_width)
        ));
    }
}
