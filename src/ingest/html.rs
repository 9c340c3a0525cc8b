//! Limpeza de HTML por cadeia de regex.
//!
//! ```text
//! <title>Doc</title><p>Hello   world</p>   →   ("Doc", "Hello world")
//! ```
//!
//! Não há parser DOM: blocos `<head>`, `<title>`, `<script>`, `<style>` e
//! `<noscript>` são removidos inteiros, o resto das tags vira espaço,
//! entidades comuns são decodificadas e o espaço em branco é colapsado.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

/// Blocos descartados com todo o conteúdo. O crate `regex` não tem
/// backreferences, então é uma regex por tag.
static DROPPED_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["head", "title", "script", "style", "noscript"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("invalid regex"))
        .collect()
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("invalid regex"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("invalid regex"));

/// Extrai `(título, texto)` de um documento HTML.
///
/// Título vazio cai para o host de `url`.
pub fn extract_html(html: &str, url: &str) -> (String, String) {
    let title = TITLE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| collapse_whitespace(&unescape_entities(m.as_str())))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| host_or_url(url));

    let mut body = COMMENT.replace_all(html, " ").into_owned();
    for block in DROPPED_BLOCKS.iter() {
        body = block.replace_all(&body, " ").into_owned();
    }
    let body = TAG.replace_all(&body, " ");
    let text = collapse_whitespace(&unescape_entities(&body));

    (title, text)
}

/// `true` quando a resposta parece HTML, pelo content-type ou pelo corpo.
pub fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("html") {
            return true;
        }
        if ct.starts_with("text/plain") || ct.contains("markdown") || ct.contains("json") {
            return false;
        }
    }
    let head = body.trim_start();
    let prefix: String = head.chars().take(256).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<!doctype html") || prefix.contains("<html")
}

/// Título para documentos não-HTML: último segmento do path, senão o host.
pub fn path_title(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| host_or_url(url))
}

pub(crate) fn host_or_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// `&amp;` por último, para que `&amp;lt;` vire `&lt;` e não `<`.
fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_and_body() {
        let (title, text) = extract_html("<title>Doc</title><p>Hello   world</p>", "https://example.com/x");
        assert_eq!(title, "Doc");
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn noise_blocks_are_dropped() {
        let html = r#"<!DOCTYPE html><html><head><meta charset="utf-8"><style>p{color:red}</style></head>
<body><script type="text/javascript">var x = "<p>no</p>";</script>
<!-- hidden --><noscript>enable js</noscript>
<h1>Raft</h1><p>Leader&nbsp;election &amp; log&#39;s &lt;replication&gt;</p></body></html>"#;
        let (title, text) = extract_html(html, "https://raft.github.io/paper");
        assert_eq!(title, "raft.github.io");
        assert_eq!(text, "Raft Leader election & log's <replication>");
    }

    #[test]
    fn double_escaped_entities_unescape_once() {
        let (_, text) = extract_html("<p>&amp;lt;b&amp;gt;</p>", "u");
        assert_eq!(text, "&lt;b&gt;");
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html(Some("text/html; charset=utf-8"), ""));
        assert!(!looks_like_html(Some("text/plain"), "<html>"));
        assert!(looks_like_html(None, "  <!DOCTYPE html><html>"));
        assert!(!looks_like_html(Some("application/octet-stream"), "# README"));
    }

    #[test]
    fn titles_for_plain_documents() {
        assert_eq!(path_title("https://example.com/docs/notes.txt"), "notes.txt");
        assert_eq!(path_title("https://example.com/docs/"), "docs");
        assert_eq!(path_title("https://example.com"), "example.com");
        assert_eq!(path_title("not a url"), "not a url");
    }
}
