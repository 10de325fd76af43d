use std::sync::OnceLock;

use regex::Regex;
use url::Url;

// Wide enough that html2text never wraps a title
const TITLE_WIDTH: usize = 4096;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\A\s*# (.+?)\s*(?:\n|\z)").expect("valid heading regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

/// Pick an article title: the extracted text's leading `# ` heading, then
/// the caller's hint, then the page `<title>`, then the URL path.
pub fn derive_title(text: &str, html: &[u8], url: &str, hint: Option<&str>) -> String {
    if let Some(caps) = heading_re().captures(text) {
        return caps[1].to_string();
    }

    if let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) {
        return hint.to_string();
    }

    if let Some(title) = html_title(html) {
        return title;
    }

    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// Contents of the page's `<title>` element with character references
/// decoded and whitespace collapsed.
pub fn html_title(html: &[u8]) -> Option<String> {
    let html = String::from_utf8_lossy(html);
    let raw = title_re().captures(&html)?.get(1)?.as_str();
    let decoded = html2text::from_read(raw.as_bytes(), TITLE_WIDTH).ok()?;
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
