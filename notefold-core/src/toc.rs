//! Heading extraction from Markdown

use crate::metadata::{HeadingEntry, Pos};

/// Extract ATX headings that start at or after `content_start`.
///
/// Lines inside `code` ranges are skipped. Positions cover the heading line
/// without its line terminator.
pub fn extract_headings(text: &str, content_start: usize, code: &[Pos]) -> Vec<HeadingEntry> {
    let mut headings = Vec::new();
    let mut line_start = 0;

    for line in text.split_inclusive('\n') {
        let start = line_start;
        line_start += line.len();

        if start < content_start || code.iter().any(|c| c.start <= start && start < c.end) {
            continue;
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        if let Some(level) = parse_atx_heading(trimmed) {
            let heading = trimmed.trim_start()[level..].trim().to_string();
            headings.push(HeadingEntry {
                level: level as u8,
                heading,
                position: Pos::new(start, start + trimmed.len()),
            });
        }
    }

    headings
}

/// Parse ATX heading (returns level if valid, None otherwise)
fn parse_atx_heading(line: &str) -> Option<usize> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }

    let hash_count = trimmed.chars().take_while(|&c| c == '#').count();
    if hash_count > 6 {
        return None;
    }

    // Must be followed by whitespace or be at end
    let rest = &trimmed[hash_count..];
    if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace()) {
        Some(hash_count)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_headings_empty() {
        assert!(extract_headings("", 0, &[]).is_empty());
    }

    #[test]
    fn test_atx_headings() {
        let text = "# Level 1\n## Level 2\n### Level 3\n";
        let headings = extract_headings(text, 0, &[]);

        assert_eq!(headings.len(), 3);
        assert_eq!(headings[0].level, 1);
        assert_eq!(headings[0].heading, "Level 1");
        assert_eq!(headings[0].position, Pos::new(0, 9));

        assert_eq!(headings[1].level, 2);
        assert_eq!(headings[1].heading, "Level 2");
        assert_eq!(headings[1].position, Pos::new(10, 20));

        assert_eq!(headings[2].level, 3);
        assert_eq!(headings[2].position, Pos::new(21, 32));
    }

    #[test]
    fn test_crlf_excluded_from_position() {
        let headings = extract_headings("# A\r\nbody\r\n", 0, &[]);
        assert_eq!(headings[0].position, Pos::new(0, 3));
    }

    #[test]
    fn test_not_headings() {
        let text = "Not a #heading\n\n#hashtag\n    # indented code\n";
        assert!(extract_headings(text, 0, &[]).is_empty());
    }

    #[test]
    fn test_skips_before_content_start() {
        let text = "---\n# yaml comment\n---\n# Real\n";
        let headings = extract_headings(text, 23, &[]);
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].heading, "Real");
    }

    #[test]
    fn test_skips_code_ranges() {
        let text = "```\n# not a heading\n```\n# Heading\n";
        let headings = extract_headings(text, 0, &[Pos::new(0, 24)]);
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].heading, "Heading");
    }

    #[test]
    fn test_all_levels() {
        let text = "# H1\n## H2\n### H3\n#### H4\n##### H5\n###### H6\n";
        let headings = extract_headings(text, 0, &[]);

        assert_eq!(headings.len(), 6);
        for (i, heading) in headings.iter().enumerate() {
            assert_eq!(heading.level, (i + 1) as u8);
        }
    }

    #[test]
    fn test_seven_hashes_not_heading() {
        assert!(extract_headings("####### Not a heading\n", 0, &[]).is_empty());
    }
}
