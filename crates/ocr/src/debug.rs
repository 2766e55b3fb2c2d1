use std::fmt::Write;

use crate::types::Line;

/// Render lines as a numbered text dump, each entry followed by a blank line.
///
/// ```text
/// # scan-042.png  (lines_post)
/// [001] words=  3  slope=+0.000°
/// PD D2160 5
/// ```
pub fn format_lines(title: &str, lines: &[Line]) -> String {
    let mut out = format!("# {title}\n");
    for (i, line) in lines.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{:03}] words={:>3}  slope={:+.3}°\n{}\n",
            i + 1,
            line.word_count(),
            line.fit.angle_deg(),
            line.text
        );
    }
    out
}
