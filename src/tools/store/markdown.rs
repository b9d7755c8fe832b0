//! Markdown scanning for tags, links, headings, and sections

use crate::tools::store::Heading;
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    tag: Regex,
    wikilink: Regex,
    mdlink: Regex,
    heading: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                tag: Regex::new(r"(?:^|\s)#([\p{L}\p{N}_/-]*[\p{L}_/-][\p{L}\p{N}_/-]*)").ok()?,
                wikilink: Regex::new(r"\[\[([^\]|#]+)(?:[#|][^\]]*)?\]\]").ok()?,
                mdlink: Regex::new(r"\[[^\]]*\]\(([^)\s]+)\)").ok()?,
                heading: Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").ok()?,
            })
        })
        .as_ref()
}

/// Tags, links, and headings found outside code fences
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scan {
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub headings: Vec<Heading>,
}

pub fn scan(content: &str) -> Scan {
    let mut out = Scan::default();
    let Some(p) = patterns() else {
        return out;
    };

    let (_, body) = split_frontmatter(content);
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = p.heading.captures(line) {
            out.headings.push(Heading {
                level: caps[1].len() as u8,
                text: caps[2].to_string(),
            });
            continue;
        }
        for caps in p.tag.captures_iter(line) {
            push_unique(&mut out.tags, caps[1].to_string());
        }
        for caps in p.wikilink.captures_iter(line) {
            push_unique(&mut out.links, caps[1].trim().to_string());
        }
        for caps in p.mdlink.captures_iter(line) {
            push_unique(&mut out.links, caps[1].to_string());
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Split off a leading `---` frontmatter block, terminator included
pub fn split_frontmatter(content: &str) -> (&str, &str) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return ("", content);
    };
    if let Some(idx) = rest.find("\n---\n") {
        let end = 4 + idx + 5;
        return content.split_at(end);
    }
    if rest.ends_with("\n---") {
        return (content, "");
    }
    ("", content)
}

/// Replace the body of the section under `heading`.
///
/// The section runs until the next heading of the same or higher level.
/// `heading` may carry its leading `#` markers. Returns `None` when no
/// heading matches.
pub fn replace_section(content: &str, heading: &str, new_body: &str) -> Option<String> {
    let p = patterns()?;
    let wanted = heading.trim().trim_start_matches('#').trim();

    let lines: Vec<&str> = content.lines().collect();
    let mut in_fence = false;
    let mut start = None;
    let mut end = lines.len();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(caps) = p.heading.captures(line) else {
            continue;
        };
        let level = caps[1].len();
        match start {
            None if &caps[2] == wanted => start = Some((idx, level)),
            Some((_, section_level)) if level <= section_level => {
                end = idx;
                break;
            }
            _ => {}
        }
    }

    let (heading_idx, _) = start?;
    let mut out: Vec<&str> = lines[..=heading_idx].to_vec();
    let body = new_body.trim_end_matches('\n');
    if !body.is_empty() {
        out.extend(body.lines());
    }
    if end < lines.len() {
        out.push("");
        out.extend(&lines[end..]);
    }

    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "---\ntitle: x\n---\n# Title\nSome #idea and #project/alpha here.\nSee [[Other Note|alias]] and [doc](docs/a.md).\n\n## Tasks\n- one #todo\n```\n# not a heading #nottag\n```\n## Done\n- zero\n";

    #[test]
    fn test_scan() {
        let scan = scan(NOTE);
        assert_eq!(scan.tags, vec!["idea", "project/alpha", "todo"]);
        assert_eq!(scan.links, vec!["Other Note", "docs/a.md"]);
        let headings: Vec<(u8, &str)> = scan
            .headings
            .iter()
            .map(|h| (h.level, h.text.as_str()))
            .collect();
        assert_eq!(headings, vec![(1, "Title"), (2, "Tasks"), (2, "Done")]);
    }

    #[test]
    fn test_numeric_hash_is_not_a_tag() {
        assert!(scan("issue #123 fixed").tags.is_empty());
        assert_eq!(scan("#2024-plan").tags, vec!["2024-plan"]);
    }

    #[test]
    fn test_split_frontmatter() {
        let (front, body) = split_frontmatter("---\na: 1\n---\nbody\n");
        assert_eq!(front, "---\na: 1\n---\n");
        assert_eq!(body, "body\n");

        let (front, body) = split_frontmatter("no frontmatter");
        assert_eq!(front, "");
        assert_eq!(body, "no frontmatter");
    }

    #[test]
    fn test_replace_section() {
        let doc = "# Title\nintro\n## Tasks\n- old\n### Sub\n- nested\n## Done\n- zero\n";
        let out = replace_section(doc, "## Tasks", "- new").unwrap();
        assert_eq!(out, "# Title\nintro\n## Tasks\n- new\n\n## Done\n- zero\n");
    }

    #[test]
    fn test_replace_last_section() {
        let doc = "# Title\n## Done\n- zero";
        let out = replace_section(doc, "Done", "- one\n- two\n").unwrap();
        assert_eq!(out, "# Title\n## Done\n- one\n- two");
    }

    #[test]
    fn test_replace_unknown_section() {
        assert!(replace_section("# Title\n", "Missing", "x").is_none());
    }
}
