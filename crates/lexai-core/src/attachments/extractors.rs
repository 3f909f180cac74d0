//! Built-in document collaborators for the codec.
//!
//! `DocxTextExtractor` reads `word/document.xml` out of the OOXML container;
//! `CalamineWorkbookParser` renders every worksheet as CSV.

#[cfg(feature = "docx")]
pub use docx::DocxTextExtractor;
#[cfg(feature = "excel")]
pub use excel::CalamineWorkbookParser;

#[cfg(feature = "docx")]
mod docx {
    use std::io::{Cursor, Read};

    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    use crate::attachments::codec::TextExtractor;
    use crate::error::ExtractionError;

    const DOCUMENT_PART: &str = "word/document.xml";

    #[derive(Debug, Default, Clone, Copy)]
    pub struct DocxTextExtractor;

    impl DocxTextExtractor {
        pub fn new() -> Self {
            Self
        }
    }

    impl TextExtractor for DocxTextExtractor {
        fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| ExtractionError::new(format!("Not a valid DOCX archive: {}", e)))?;

            let mut entry = archive
                .by_name(DOCUMENT_PART)
                .map_err(|e| ExtractionError::new(format!("Missing {}: {}", DOCUMENT_PART, e)))?;

            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| ExtractionError::new(format!("Failed to read {}: {}", DOCUMENT_PART, e)))?;

            document_text(&xml)
        }
    }

    /// Raw text of a WordprocessingML body: one blank-line-terminated block per paragraph.
    fn document_text(xml: &str) -> Result<String, ExtractionError> {
        let mut reader = Reader::from_str(xml);
        let mut out = String::new();
        let mut in_text_run = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if e.name().as_ref() == b"w:t" {
                        in_text_run = true;
                    }
                }
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"w:tab" => out.push('\t'),
                    b"w:br" | b"w:cr" => out.push('\n'),
                    b"w:p" => out.push_str("\n\n"),
                    _ => {}
                },
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:t" => in_text_run = false,
                    b"w:p" => out.push_str("\n\n"),
                    _ => {}
                },
                Ok(Event::Text(t)) if in_text_run => {
                    let text = t
                        .unescape()
                        .map_err(|e| ExtractionError::new(format!("Malformed document text: {}", e)))?;
                    out.push_str(&text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ExtractionError::new(format!(
                        "Malformed document XML at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(out)
    }

}

#[cfg(feature = "excel")]
mod excel {
    use std::io::Cursor;

    use calamine::{Data, Reader, open_workbook_auto_from_rs};

    use crate::attachments::codec::{SheetText, WorkbookParser};
    use crate::error::ExtractionError;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct CalamineWorkbookParser;

    impl CalamineWorkbookParser {
        pub fn new() -> Self {
            Self
        }
    }

    impl WorkbookParser for CalamineWorkbookParser {
        fn parse_workbook(&self, bytes: &[u8]) -> Result<Vec<SheetText>, ExtractionError> {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
                .map_err(|e| ExtractionError::new(format!("Unreadable workbook: {}", e)))?;

            let names: Vec<String> = workbook.sheet_names().to_owned();
            let mut sheets = Vec::with_capacity(names.len());

            for name in names {
                let range = workbook
                    .worksheet_range(&name)
                    .map_err(|e| ExtractionError::new(format!("Unreadable sheet '{}': {}", name, e)))?;

                let delimited_text = range
                    .rows()
                    .map(|row| row.iter().map(cell_text).map(|c| csv_field(&c)).collect::<Vec<_>>().join(","))
                    .collect::<Vec<_>>()
                    .join("\n");

                sheets.push(SheetText {
                    name,
                    delimited_text,
                });
            }

            Ok(sheets)
        }
    }

    fn cell_text(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            other => other.to_string(),
        }
    }

    fn csv_field(value: &str) -> String {
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

}
