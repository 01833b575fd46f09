//! Byte decoding and the repair pre-pass run before every structured parse.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Namespaces commonly used without being declared.
const NAMESPACES: &[(&str, &str)] = &[
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("content", "http://purl.org/rss/1.0/modules/content/"),
    ("sy", "http://purl.org/rss/1.0/modules/syndication/"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("atom", "http://www.w3.org/2005/Atom"),
    ("media", "http://search.yahoo.com/mrss/"),
];

static DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("valid encoding regex")
});

static ENCODING_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<\?xml[^>]*?encoding\s*=\s*["'])[^"']*(["'])"#).expect("valid encoding attr regex")
});

static ITEM_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<item[\s>/]").expect("valid item regex"));

static ENTRY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<entry[\s>/]").expect("valid entry regex"));

static CONTAINER_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(rss|channel|rdf:rdf|rdf|feed|atom:feed)[\s>/]").expect("valid container regex")
});

/// Decode fetched bytes to UTF-8. Never fails.
///
/// Order: byte-order mark, the XML declaration's `encoding`, valid UTF-8,
/// then Windows-1252.
pub fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    if let Some(label) = DECLARED_ENCODING
        .captures(&head)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
    {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            // An ASCII-readable declaration cannot be UTF-16.
            if encoding != UTF_8 && encoding.is_ascii_compatible() {
                let (text, _) = encoding.decode_without_bom_handling(bytes);
                return text.into_owned();
            }
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

/// Repair common defects so the tolerant XML reader can build a tree.
pub fn repair(content: &str) -> String {
    let content = strip_bom(content);
    let content = normalize_line_endings(content);
    let content = strip_control_chars(&content);
    let content = ensure_declaration(content.trim_start());
    let content = wrap_fragments(&content);
    inject_namespaces(&content)
}

pub fn strip_bom(content: &str) -> &str {
    content.trim_start_matches('\u{feff}')
}

pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Remove characters XML 1.0 forbids.
pub fn strip_control_chars(content: &str) -> String {
    content
        .chars()
        .filter(|&c| {
            !matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
        })
        .collect()
}

/// Prepend a declaration if missing; otherwise force its encoding to UTF-8.
pub fn ensure_declaration(content: &str) -> String {
    if content.starts_with("<?xml") {
        ENCODING_ATTR
            .replace(content, "${1}UTF-8${2}")
            .into_owned()
    } else {
        format!("{}\n{}", XML_DECLARATION, content)
    }
}

/// Wrap bare `<item>` or `<entry>` fragments in a container element.
pub fn wrap_fragments(content: &str) -> String {
    if CONTAINER_TAG.is_match(content) {
        return content.to_string();
    }

    let (open, close) = if ITEM_TAG.is_match(content) {
        (r#"<rss version="2.0"><channel>"#, "</channel></rss>")
    } else if ENTRY_TAG.is_match(content) {
        (r#"<feed xmlns="http://www.w3.org/2005/Atom">"#, "</feed>")
    } else {
        return content.to_string();
    };

    let (prolog, body) = split_prolog(content);
    format!("{}{}\n{}\n{}", prolog, open, body.trim(), close)
}

/// Declare `dc`, `content`, `sy`, `rdf`, `atom` and `media` on the root
/// element when their prefixes are used but never declared.
pub fn inject_namespaces(content: &str) -> String {
    let missing: Vec<String> = NAMESPACES
        .iter()
        .filter(|(prefix, _)| {
            content.contains(&format!("<{}:", prefix))
                && !content.contains(&format!("xmlns:{}=", prefix))
        })
        .map(|(prefix, uri)| format!(r#" xmlns:{}="{}""#, prefix, uri))
        .collect();

    if missing.is_empty() {
        return content.to_string();
    }

    let Some(insert_at) = root_tag_end(content) else {
        return content.to_string();
    };

    let mut repaired = String::with_capacity(content.len() + 128);
    repaired.push_str(&content[..insert_at]);
    repaired.push_str(&missing.concat());
    repaired.push_str(&content[insert_at..]);
    repaired
}

/// Split leading declaration, comments and doctype from the document body.
fn split_prolog(content: &str) -> (&str, &str) {
    let mut offset = 0;
    loop {
        let rest = &content[offset..];
        let trimmed = rest.trim_start();
        let skipped = rest.len() - trimmed.len();
        let end = if trimmed.starts_with("<?") {
            trimmed.find("?>").map(|i| i + 2)
        } else if trimmed.starts_with("<!--") {
            trimmed.find("-->").map(|i| i + 3)
        } else if trimmed.starts_with("<!") {
            trimmed.find('>').map(|i| i + 1)
        } else {
            None
        };
        match end {
            Some(end) => offset += skipped + end,
            None => return (&content[..offset], &content[offset..]),
        }
    }
}

/// Byte offset just before the closing `>` (or `/>`) of the root start tag.
fn root_tag_end(content: &str) -> Option<usize> {
    let (prolog, body) = split_prolog(content);
    let start = prolog.len() + body.find('<')?;
    let bytes = content.as_bytes();

    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    return Some(if i > 0 && bytes[i - 1] == b'/' { i - 1 } else { i });
                }
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_passthrough() {
        assert_eq!(decode("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_decode_strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<rss/>");
        assert_eq!(decode(&bytes), "<rss/>");
    }

    #[test]
    fn test_decode_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<rss/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes), "<rss/>");
    }

    #[test]
    fn test_decode_declared_latin1() {
        let mut bytes = br#"<?xml version="1.0" encoding="ISO-8859-1"?><title>Caf"#.to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</title>");
        assert!(decode(&bytes).contains("Café"));
    }

    #[test]
    fn test_decode_invalid_utf8_falls_back_to_windows_1252() {
        let bytes = [b'a', 0x93, b'q', 0x94];
        assert_eq!(decode(&bytes), "a\u{201c}q\u{201d}");
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn test_strip_control_chars_keeps_whitespace() {
        assert_eq!(strip_control_chars("a\u{1}b\tc\nd\u{b}"), "ab\tc\nd");
    }

    #[test]
    fn test_ensure_declaration_injects() {
        let repaired = ensure_declaration("<rss/>");
        assert!(repaired.starts_with("<?xml version=\"1.0\""));
        assert!(repaired.ends_with("<rss/>"));
    }

    #[test]
    fn test_ensure_declaration_rewrites_encoding() {
        let repaired = ensure_declaration(r#"<?xml version="1.0" encoding="windows-1251"?><rss/>"#);
        assert_eq!(repaired, r#"<?xml version="1.0" encoding="UTF-8"?><rss/>"#);
    }

    #[test]
    fn test_wrap_bare_items() {
        let repaired = wrap_fragments("<?xml version=\"1.0\"?>\n<item><title>a</title></item>");
        assert!(repaired.starts_with("<?xml version=\"1.0\"?>"));
        assert!(repaired.contains("<rss version=\"2.0\"><channel>"));
        assert!(repaired.trim_end().ends_with("</channel></rss>"));
    }

    #[test]
    fn test_wrap_bare_entries() {
        let repaired = wrap_fragments("<entry><title>a</title></entry>");
        assert!(repaired.starts_with("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
    }

    #[test]
    fn test_wrap_leaves_complete_documents() {
        let doc = "<rss><channel><item/></channel></rss>";
        assert_eq!(wrap_fragments(doc), doc);
    }

    #[test]
    fn test_inject_missing_namespaces() {
        let doc = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><item><dc:creator>x</dc:creator>\
                   <content:encoded>y</content:encoded></item></channel></rss>";
        let repaired = inject_namespaces(doc);
        assert!(repaired.contains(
            "<rss version=\"2.0\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
             xmlns:content=\"http://purl.org/rss/1.0/modules/content/\">"
        ));
    }

    #[test]
    fn test_inject_skips_declared_namespaces() {
        let doc = "<rss xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:date>x</dc:date></rss>";
        assert_eq!(inject_namespaces(doc), doc);
    }

    #[test]
    fn test_inject_into_self_closing_root_with_quoted_gt() {
        let doc = "<root title=\"a>b\"/><dc:x/>";
        let repaired = inject_namespaces(doc);
        assert!(repaired.starts_with("<root title=\"a>b\" xmlns:dc="));
        assert!(repaired.contains("\"/><dc:x/>"));
    }

    #[test]
    fn test_repair_full_pass() {
        let repaired = repair("\u{feff}\r\n<item><title>a\u{1}</title><dc:date>2024</dc:date></item>");
        assert!(repaired.starts_with(XML_DECLARATION));
        assert!(repaired.contains("<rss version=\"2.0\" xmlns:dc="));
        assert!(!repaired.contains('\r'));
        assert!(!repaired.contains('\u{1}'));
    }
}
