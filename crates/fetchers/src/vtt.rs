//! VTT/SRT subtitle parsing into plain transcript text.

/// Strip a subtitle file down to its spoken text: headers, cue indices,
/// timestamp lines, and inline tags go; consecutive duplicate lines (an
/// auto-captioning artifact) are collapsed.
pub fn parse_subtitle_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut last_line = String::new();

    for line in raw.lines() {
        let line = line.trim();

        if line.is_empty()
            || line.starts_with("WEBVTT")
            || line.starts_with("Kind:")
            || line.starts_with("Language:")
            || line.starts_with("NOTE")
            || line.starts_with("STYLE")
            || line.contains("-->")
        {
            continue;
        }
        // SRT cue numbers.
        if line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let cleaned = strip_tags(line);
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() || cleaned == last_line {
            continue;
        }
        last_line = cleaned.clone();
        lines.push(cleaned);
    }

    // Captions split mid-sentence; spaces read better than newlines.
    lines.join(" ")
}

/// Remove `<...>` spans: HTML tags and inline timestamps alike.
fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
