use crate::error::{Error, Result};

pub fn is_pdf(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".pdf")
}

/// Concatenated text of every page.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| Error::parse(format!("PDF: {e}")))
}
