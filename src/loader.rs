//! Multi-format document loading.
//!
//! Turns a file on disk into plain UTF-8 text for chunking. Markdown,
//! plain text, and HTML are read directly (HTML is tag-stripped); PDF and
//! DOCX are binary formats extracted via `pdf-extract` and `zip` +
//! `quick-xml`. Loading never panics; unsupported or unreadable files
//! return a [`LoadError`] and the sync engine skips that document.

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes read from a DOCX ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum LoadError {
    UnsupportedFormat(String),
    Read(String),
    Parse(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnsupportedFormat(ext) => write!(f, "unsupported format: .{}", ext),
            LoadError::Read(e) => write!(f, "read failed: {}", e),
            LoadError::Parse(e) => write!(f, "extraction failed: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load a document's text content, dispatching on file extension.
///
/// A zero-length file yields an empty string, not an error.
pub fn load_text(path: &Path) -> Result<String, LoadError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "md" | "txt" => {
            std::fs::read_to_string(path).map_err(|e| LoadError::Read(e.to_string()))
        }
        "html" => {
            let raw =
                std::fs::read_to_string(path).map_err(|e| LoadError::Read(e.to_string()))?;
            Ok(strip_html(&raw))
        }
        "pdf" => {
            let bytes = std::fs::read(path).map_err(|e| LoadError::Read(e.to_string()))?;
            if bytes.is_empty() {
                return Ok(String::new());
            }
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| LoadError::Parse(e.to_string()))
        }
        "docx" => {
            let bytes = std::fs::read(path).map_err(|e| LoadError::Read(e.to_string()))?;
            if bytes.is_empty() {
                return Ok(String::new());
            }
            extract_docx(&bytes)
        }
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

/// Strip tags from HTML, keeping text content with whitespace between
/// formerly tagged regions. Script and style bodies are dropped.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();
    let mut skip_until_close: Option<&str> = None;

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            if skip_until_close.is_none() {
                out.push(c);
            }
            continue;
        }

        let rest = &html[i..];
        if let Some(tag) = skip_until_close {
            if rest.len() >= tag.len() && rest[1..].to_lowercase().starts_with(tag) {
                skip_until_close = None;
            }
        } else {
            let lower = rest[1..].chars().take(7).collect::<String>().to_lowercase();
            if lower.starts_with("script") {
                skip_until_close = Some("/script");
            } else if lower.starts_with("style") {
                skip_until_close = Some("/style");
            }
        }

        // Consume through the closing '>'
        for (_, tc) in chars.by_ref() {
            if tc == '>' {
                break;
            }
        }
        if skip_until_close.is_none() {
            out.push(' ');
        }
    }

    decode_entities(&out)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Extract text from a DOCX: pull `word/document.xml` out of the ZIP and
/// collect `w:t` runs, inserting paragraph breaks at `w:p` boundaries.
fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Parse(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| LoadError::Parse("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| LoadError::Parse(e.to_string()))?;
    }
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Parse(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                in_text_run = e.local_name().as_ref() == b"t";
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"t" => in_text_run = false,
                    // Paragraph boundary: keep chunker-friendly separation
                    b"p" if !out.is_empty() && !out.ends_with("\n\n") => out.push_str("\n\n"),
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}
