use crate::types::Pt;

// Approximate Helvetica advance widths in 1/1000 em. Backends only ever use the base-14
// Helvetica pair, so a class table is accurate enough for wrapping and alignment.
fn advance_milli_em(ch: char, bold: bool) -> i32 {
    let base = match ch {
        ' ' => 278,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 222,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '/' | '-' => 333,
        'm' | 'M' => 833,
        'w' | 'W' | '@' => 944,
        '%' => 889,
        '0'..='9' | '$' | '#' => 556,
        'A'..='Z' => 667,
        'a'..='z' => 556,
        _ => 600,
    };
    if bold { base + base / 18 } else { base }
}

pub fn measure_text_width(text: &str, font_size: Pt, bold: bool) -> Pt {
    let milli_em: i64 = text.chars().map(|ch| advance_milli_em(ch, bold) as i64).sum();
    let size_milli = font_size.to_milli_i64();
    Pt::from_milli_i64(milli_em * size_milli / 1000)
}

/// Greedy word wrap. Words wider than `max_width` are split by character.
pub fn wrap_lines(text: &str, max_width: Pt, font_size: Pt, bold: bool) -> Vec<String> {
    let max_width = max_width.max(Pt::from_f32(1.0));
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure_text_width(&candidate, font_size, bold) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if measure_text_width(word, font_size, bold) <= max_width {
                current = word.to_string();
            } else {
                let mut parts = split_long_word(word, max_width, font_size, bold);
                current = parts.pop().unwrap_or_default();
                lines.extend(parts);
            }
        }
        lines.push(current);
    }
    while lines.len() > 1 && lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

fn split_long_word(word: &str, max_width: Pt, font_size: Pt, bold: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if current.chars().count() > 1 && measure_text_width(&current, font_size, bold) > max_width {
            current.pop();
            parts.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

pub fn truncate_with_ellipsis(text: &str, max_width: Pt, font_size: Pt, bold: bool) -> String {
    if measure_text_width(text, font_size, bold) <= max_width {
        return text.to_string();
    }
    let ellipsis = "...";
    let mut out = String::new();
    for ch in text.chars() {
        out.push(ch);
        let candidate = format!("{}{ellipsis}", out.trim_end());
        if measure_text_width(&candidate, font_size, bold) > max_width {
            out.pop();
            break;
        }
    }
    format!("{}{ellipsis}", out.trim_end())
}
