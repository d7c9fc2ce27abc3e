use serde::Serialize;
use std::fmt;

/// ZIP local-file-header magic, shared by every XLSX package.
const ARCHIVE_MAGIC: [u8; 2] = [0x50, 0x4B];

/// Binary format of a fetched document, as discovered from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatKind {
    WorkbookArchive,
    DelimitedText,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::WorkbookArchive => write!(f, "XLSX"),
            FormatKind::DelimitedText => write!(f, "CSV"),
        }
    }
}

/// Classifies content by its leading bytes.
///
/// Whatever the host declared is ignored: anything that does not start
/// with the archive magic is treated as a delimited text table.
pub fn classify(bytes: &[u8]) -> FormatKind {
    if bytes.starts_with(&ARCHIVE_MAGIC) {
        FormatKind::WorkbookArchive
    } else {
        FormatKind::DelimitedText
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_header_is_workbook() {
        assert_eq!(classify(b"PK\x03\x04rest"), FormatKind::WorkbookArchive);
    }

    #[test]
    fn test_everything_else_is_text() {
        assert_eq!(classify(b"Empresa,Codigo,,"), FormatKind::DelimitedText);
        assert_eq!(classify(b"P"), FormatKind::DelimitedText);
        assert_eq!(classify(b""), FormatKind::DelimitedText);
        assert_eq!(classify(b"<html>"), FormatKind::DelimitedText);
    }
}
