//! Final report formatting.

use crate::engine::FinalReport;

/// Format a final report as a human-readable summary.
pub fn format_summary(report: &FinalReport) -> String {
    let mut summary = format!(
        "{} probe against {}: {} attempts ({} ok, {} failed) in {:.1}s ({:.1}/s), {}",
        report.method,
        report.target,
        format_number(report.attempts),
        format_number(report.successes),
        format_number(report.failures),
        report.elapsed_sec,
        report.rate,
        report.end_state,
    );

    if report.bytes_sent > 0 {
        summary.push_str(&format!(", {} sent", format_bytes(report.bytes_sent)));
    }
    if let Some(err) = &report.error {
        summary.push_str(&format!(" ({err})"));
    }

    summary
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a byte count with a binary unit suffix.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b >= GIB {
        format!("{:.2} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}
