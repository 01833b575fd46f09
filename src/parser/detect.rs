use super::FeedFormat;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RSS1_NS: &str = "http://purl.org/rss/1.0/";
pub const ATOM_NS: &str = "http://www.w3.org/2005/atom";
pub const ATOM03_NS: &str = "http://purl.org/atom/ns#";

/// Classify raw content. Never fails; content without markers is `Unknown`.
pub fn detect(content: &str) -> FeedFormat {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return FeedFormat::Unknown;
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
            return FeedFormat::Json;
        }
        if !trimmed.contains('<') && looks_like_json_feed(trimmed) {
            return FeedFormat::Json;
        }
    }

    let lower = trimmed.to_ascii_lowercase();

    let rss_root = lower.contains("<rss");
    if lower.contains("<rdf:rdf") {
        return FeedFormat::Rdf;
    }

    let atom_root = has_tag(&lower, "feed") || lower.contains("<atom:feed");
    if atom_root && !rss_root {
        return FeedFormat::Atom;
    }

    if !rss_root && (lower.contains(RDF_NS) || declares_rss1_namespace(&lower)) {
        return FeedFormat::Rdf;
    }

    let rss_markers = rss_root || lower.contains("<channel");
    let atom_ns = lower.contains(ATOM_NS) || lower.contains(ATOM03_NS);

    if !rss_markers && (atom_ns || has_tag(&lower, "entry")) {
        return FeedFormat::Atom;
    }

    if rss_markers {
        return FeedFormat::Rss;
    }

    FeedFormat::Unknown
}

/// The RSS 1.0 namespace as a whole attribute value, not as the prefix of
/// one of its module namespaces (`.../rss/1.0/modules/content/`).
fn declares_rss1_namespace(lower: &str) -> bool {
    lower.contains(&format!("\"{}\"", RSS1_NS)) || lower.contains(&format!("'{}'", RSS1_NS))
}

fn looks_like_json_feed(lower: &str) -> bool {
    lower.contains("jsonfeed.org") || lower.contains("\"items\"")
}

fn has_tag(lower: &str, tag: &str) -> bool {
    let open = format!("<{}", tag);
    lower.match_indices(&open).any(|(pos, _)| {
        matches!(
            lower[pos + open.len()..].chars().next(),
            Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('\r') | Some('/')
        )
    })
}
