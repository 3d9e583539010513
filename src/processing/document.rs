//! Loading uploaded files into [`Document`]s.

use super::types::DocumentError;
use std::path::Path;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// A source document: an identifier plus its extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name or path identifying the document.
    pub id: String,
    /// Extracted text.
    pub content: String,
}

impl Document {
    /// Wrap already extracted text.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Read a document from disk.
    pub async fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_bytes(path.display().to_string(), bytes).await
    }

    /// Decode uploaded bytes. PDFs are detected by extension or magic number; everything else
    /// must be UTF-8 text.
    ///
    /// Decoding runs on the blocking pool. `pdf-extract` panics on some malformed files; such a
    /// panic is reported as [`DocumentError::Unreadable`] for this document only.
    pub async fn from_bytes(
        id: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, DocumentError> {
        let id = id.into();
        let task_id = id.clone();
        tokio::task::spawn_blocking(move || decode(task_id, bytes))
            .await
            .map_err(|error| DocumentError::Unreadable {
                id,
                reason: format!("text extraction aborted: {error}"),
            })?
    }
}

fn decode(id: String, bytes: Vec<u8>) -> Result<Document, DocumentError> {
    let content = if is_pdf(&id, &bytes) {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|error| DocumentError::Unreadable {
            id: id.clone(),
            reason: format!("PDF text extraction failed: {error}"),
        })?
    } else {
        String::from_utf8(bytes).map_err(|error| DocumentError::Unreadable {
            id: id.clone(),
            reason: format!("not valid UTF-8: {error}"),
        })?
    };

    if content.trim().is_empty() {
        return Err(DocumentError::Empty(id));
    }
    Ok(Document { id, content })
}

fn is_pdf(id: &str, bytes: &[u8]) -> bool {
    let by_extension = Path::new(id)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    by_extension || bytes.starts_with(PDF_MAGIC)
}


#[cfg(test)]
pub(crate) mod testing {
    /// A structurally valid one-page PDF whose page has no `/MediaBox`.
    pub(crate) fn pdf_without_media_box() -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /Resources << >> /Contents 4 0 R >>",
            "<< /Length 13 >>\nstream\nBT (hi) Tj ET\nendstream",
        ];
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }
        let xref = pdf.len();
        pdf.extend_from_slice(
            format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        );
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        pdf
    }
}
