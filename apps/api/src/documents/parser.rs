//! Text extraction from uploaded resumes (PDF and DOCX).

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum DocumentParserError {
    #[error("Unsupported file format. Only PDF and DOCX are supported. Got: {0}")]
    Unsupported(String),

    #[error("Failed to parse PDF: {0}")]
    Pdf(String),

    #[error("Failed to parse DOCX: {0}")]
    Docx(String),

    #[error("No text content found in {0}")]
    Empty(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
}

impl DocumentType {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            Some(DocumentType::Pdf)
        } else if lower.ends_with(".docx") {
            Some(DocumentType::Docx)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "application/pdf",
            DocumentType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub text: String,
    pub doc_type: DocumentType,
}

static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:tbl>.*?</w:tbl>").expect("table pattern compiles"));
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:tr(?:\s[^>]*[^/>])?>.*?</w:tr>").expect("row pattern compiles")
});
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:tc(?:\s[^>]*[^/>])?>.*?</w:tc>").expect("cell pattern compiles")
});
static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:p(?:\s[^>]*[^/>])?>(.*?)</w:p>").expect("paragraph pattern compiles")
});
static RUN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>").expect("text pattern compiles")
});

pub struct DocumentParser;

impl DocumentParser {
    /// Dispatches on the file extension.
    pub fn parse_document(
        bytes: &[u8],
        filename: &str,
    ) -> Result<ParsedDocument, DocumentParserError> {
        let doc_type = DocumentType::from_filename(filename)
            .ok_or_else(|| DocumentParserError::Unsupported(filename.to_string()))?;
        let text = match doc_type {
            DocumentType::Pdf => Self::parse_pdf(bytes)?,
            DocumentType::Docx => Self::parse_docx(bytes)?,
        };
        Ok(ParsedDocument { text, doc_type })
    }

    pub fn parse_pdf(bytes: &[u8]) -> Result<String, DocumentParserError> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| DocumentParserError::Pdf("document structure is unreadable".into()))?
            .map_err(|e| {
                error!("Failed to parse PDF: {e}");
                DocumentParserError::Pdf(e.to_string())
            })?;

        let text = extracted.trim();
        if text.is_empty() {
            return Err(DocumentParserError::Empty("PDF"));
        }
        Ok(text.to_string())
    }

    /// Body paragraphs one per line, then table rows with cells joined by `" | "`.
    pub fn parse_docx(bytes: &[u8]) -> Result<String, DocumentParserError> {
        let xml = read_document_xml(bytes).map_err(|e| {
            error!("Failed to parse DOCX: {e}");
            DocumentParserError::Docx(e)
        })?;

        let body = TABLE.replace_all(&xml, "");
        let paragraphs: Vec<String> = paragraphs_of(&body)
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();

        let mut rows = Vec::new();
        for table in TABLE.find_iter(&xml) {
            for row in ROW.find_iter(table.as_str()) {
                let cells: Vec<String> = CELL
                    .find_iter(row.as_str())
                    .map(|cell| paragraphs_of(cell.as_str()).join("\n"))
                    .collect();
                if cells.iter().any(|c| !c.trim().is_empty()) {
                    rows.push(cells.join(" | "));
                }
            }
        }

        let mut text = paragraphs.join("\n");
        if !rows.is_empty() {
            text.push_str("\n\n");
            text.push_str(&rows.join("\n"));
        }

        if text.trim().is_empty() {
            return Err(DocumentParserError::Empty("DOCX"));
        }
        Ok(text)
    }
}

fn read_document_xml(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| format!("word/document.xml: {e}"))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| e.to_string())?;
    Ok(xml)
}

fn paragraphs_of(xml: &str) -> Vec<String> {
    PARAGRAPH
        .captures_iter(xml)
        .map(|p| {
            let inner = p.get(1).map_or("", |m| m.as_str());
            RUN_TEXT
                .captures_iter(inner)
                .map(|t| match t.get(1) {
                    Some(text) => unescape_xml(text.as_str()),
                    None => "\t".to_string(),
                })
                .collect::<String>()
        })
        .collect()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    fn paragraph(text: &str) -> String {
        format!(r#"<w:p w:rsidR="00A1"><w:pPr><w:pStyle w:val="Normal"/></w:pPr><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
    }

    fn cell(text: &str) -> String {
        format!("<w:tc><w:tcPr/>{}</w:tc>", paragraph(text))
    }

    /// Minimal DOCX archive wrapping `body` in a document element.
    pub(crate) fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        );
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn sample_docx() -> Vec<u8> {
        docx_with_body(&format!(
            "{}{}<w:p/>",
            paragraph("Jane Doe"),
            paragraph("Senior Engineer at Acme &amp; Co")
        ))
    }

    #[test]
    fn test_docx_paragraphs() {
        let text = DocumentParser::parse_docx(&sample_docx()).unwrap();
        assert_eq!(text, "Jane Doe\nSenior Engineer at Acme & Co");
    }

    #[test]
    fn test_docx_tables_follow_paragraphs() {
        let body = format!(
            "{}<w:tbl><w:tblPr/><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr></w:tbl>",
            paragraph("Skills"),
            cell("Rust"),
            cell("5 years"),
            cell(""),
            cell(""),
        );
        let text = DocumentParser::parse_docx(&docx_with_body(&body)).unwrap();
        assert_eq!(text, "Skills\n\nRust | 5 years");
    }

    #[test]
    fn test_docx_without_text_is_empty_error() {
        let err = DocumentParser::parse_docx(&docx_with_body("<w:p/>")).unwrap_err();
        assert!(matches!(err, DocumentParserError::Empty("DOCX")));
    }

    #[test]
    fn test_docx_that_is_not_a_zip() {
        let err = DocumentParser::parse_docx(b"plain text").unwrap_err();
        assert!(matches!(err, DocumentParserError::Docx(_)));
    }

    #[test]
    fn test_invalid_pdf_is_an_error() {
        let err = DocumentParser::parse_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, DocumentParserError::Pdf(_)));
    }

    #[test]
    fn test_dispatch_by_extension() {
        let parsed = DocumentParser::parse_document(&sample_docx(), "Resume.DOCX").unwrap();
        assert_eq!(parsed.doc_type, DocumentType::Docx);

        let err = DocumentParser::parse_document(b"hello", "resume.txt").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file format. Only PDF and DOCX are supported. Got: resume.txt"
        );
    }
}
