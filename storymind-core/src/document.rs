//! Document loading (C1): recognize a source file's format, extract its
//! text, and split it into windows.
//!
//! Recognized formats are PDF (via the pure-Rust `pdf-extract` fallback
//! extractor — the teacher tries a layout-aware backend before falling back
//! to this; we only carry the fallback since there is no layout-aware
//! backend in this crate's dependency set), EPUB (via the `epub` crate,
//! walking spine chapters and stripping HTML), and UTF-8 plain text.

use std::path::Path;

use crate::chunker::{window_document, Window};
use crate::error::{Result, StoryMindError};

/// Format tag recorded alongside a loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Epub,
    Text,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Pdf => "pdf",
            SourceFormat::Epub => "epub",
            SourceFormat::Text => "text",
        }
    }
}

/// Metadata produced by the loader alongside the document's windows.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    /// Display title: embedded metadata if present, else the filename stem.
    pub title: String,
    pub author: Option<String>,
    pub format: SourceFormat,
    pub window_count: usize,
}

/// Load `path`, extract its text, and split it into windows.
///
/// Fails with `UnsupportedFormat` for unrecognized extensions and
/// `DocumentLoadFailed` for recognized-but-unparseable or empty-text files.
pub fn load(path: &Path) -> Result<(SourceMetadata, Vec<Window>)> {
    let format = detect_format(path)?;

    let (content, title_hint, author) = match format {
        SourceFormat::Pdf => extract_pdf(path)?,
        SourceFormat::Epub => extract_epub(path)?,
        SourceFormat::Text => (extract_text(path)?, None, None),
    };

    if content.trim().is_empty() {
        return Err(StoryMindError::DocumentLoadFailed(format!(
            "{} contains no extractable text",
            path.display()
        )));
    }

    let title = title_hint.unwrap_or_else(|| filename_stem(path));
    let windows = window_document(&content);

    let metadata = SourceMetadata {
        title,
        author,
        format,
        window_count: windows.len(),
    };

    Ok((metadata, windows))
}

fn detect_format(path: &Path) -> Result<SourceFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
    {
        Some(ext) if ext == "pdf" => Ok(SourceFormat::Pdf),
        Some(ext) if ext == "epub" => Ok(SourceFormat::Epub),
        Some(ext) if ext == "txt" => Ok(SourceFormat::Text),
        None => Ok(SourceFormat::Text),
        Some(other) => Err(StoryMindError::UnsupportedFormat(other)),
    }
}

fn filename_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

fn extract_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        StoryMindError::DocumentLoadFailed(format!("{}: {e}", path.display()))
    })
}

/// Extract text from a PDF using the pure-Rust `pdf-extract` crate.
fn extract_pdf(path: &Path) -> Result<(String, Option<String>, Option<String>)> {
    let text = pdf_extract::extract_text(path).map_err(|e| {
        StoryMindError::DocumentLoadFailed(format!("failed to extract PDF text: {e}"))
    })?;
    tracing::debug!("PDF extracted with pdf_extract: {} chars", text.len());
    Ok((text, None, None))
}

/// Extract text from an EPUB ebook, chapter by chapter, stripping HTML tags.
fn extract_epub(path: &Path) -> Result<(String, Option<String>, Option<String>)> {
    use epub::doc::EpubDoc;

    let mut doc = EpubDoc::new(path).map_err(|e| {
        StoryMindError::DocumentLoadFailed(format!("failed to open EPUB: {e}"))
    })?;

    let title = doc.mdata("title").map(|m| m.trim().to_string()).filter(|s| !s.is_empty());
    let author = doc
        .mdata("creator")
        .map(|m| m.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut all_text = String::new();
    let num_chapters = doc.get_num_pages();
    for chapter in 0..num_chapters {
        doc.set_current_page(chapter);
        if let Some((content, _mime)) = doc.get_current_str() {
            let text = strip_html_tags(&content);
            let text = text.trim();
            if !text.is_empty() {
                all_text.push_str(text);
                all_text.push_str("\n\n");
            }
        }
    }

    tracing::debug!("EPUB extracted: {} chars across {} chapters", all_text.len(), num_chapters);
    Ok((all_text, title, author))
}

/// Strip HTML tags from a string, preserving text content.
///
/// Skips `<script>`/`<style>` bodies entirely; everything else between
/// angle brackets is dropped and the surrounding text is kept.
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_skip = false;

    let chars: Vec<char> = html.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '<' => {
                in_tag = true;
                let rest: String = chars[i..].iter().take(7).collect::<String>().to_ascii_lowercase();
                if rest.starts_with("<script") || rest.starts_with("<style") {
                    in_skip = true;
                } else if rest.starts_with("</scrip") || rest.starts_with("</style") {
                    in_skip = false;
                }
            }
            '>' => {
                in_tag = false;
            }
            c => {
                if !in_tag && !in_skip {
                    result.push(c);
                }
            }
        }
        i += 1;
    }

    // Collapse runs of whitespace left behind by stripped tags.
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(
            detect_format(Path::new("book.pdf")).unwrap(),
            SourceFormat::Pdf
        );
        assert_eq!(
            detect_format(Path::new("book.epub")).unwrap(),
            SourceFormat::Epub
        );
        assert_eq!(
            detect_format(Path::new("book.txt")).unwrap(),
            SourceFormat::Text
        );
        assert_eq!(
            detect_format(Path::new("book")).unwrap(),
            SourceFormat::Text
        );
    }

    #[test]
    fn detect_format_rejects_unknown_extension() {
        let err = detect_format(Path::new("book.docx")).unwrap_err();
        assert!(matches!(err, StoryMindError::UnsupportedFormat(_)));
    }

    #[test]
    fn load_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HP-PS.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Harry Potter lived at number four, Privet Drive.").unwrap();

        let (meta, windows) = load(&path).unwrap();
        assert_eq!(meta.title, "HP-PS");
        assert_eq!(meta.format, SourceFormat::Text);
        assert!(!windows.is_empty());
    }

    #[test]
    fn load_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::File::create(&path).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, StoryMindError::DocumentLoadFailed(_)));
    }

    #[test]
    fn strip_html_tags_keeps_text_drops_markup() {
        let html = "<html><body><p>Hello <b>World</b></p><script>evil()</script></body></html>";
        let text = strip_html_tags(html);
        assert_eq!(text, "Hello World");
    }
}
