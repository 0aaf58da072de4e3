//! XML pretty-printing for context output

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::Event;
use thiserror::Error;

const INDENT_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("malformed markup at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("failed to write markup: {0}")]
    Write(String),

    #[error("formatted markup is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Re-indent an XML document, optionally dropping the `<?xml ...?>` declaration.
///
/// Whitespace-only text between elements is discarded so the writer can
/// apply its own indentation. The result ends with a newline.
pub fn pretty_print(source: &str, strip_declaration: bool) -> Result<String, MarkupError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_SIZE);

    loop {
        let event = reader.read_event().map_err(|e| MarkupError::Parse {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Eof => break,
            Event::Decl(_) if strip_declaration => {}
            event => writer
                .write_event(event)
                .map_err(|e| MarkupError::Write(e.to_string()))?,
        }
    }

    let mut formatted = String::from_utf8(writer.into_inner())?;
    if !formatted.ends_with('\n') {
        formatted.push('\n');
    }
    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reindents_nested_elements() {
        let source = "<project><name>demo</name><deps><dep id=\"a\"/></deps></project>";
        let formatted = pretty_print(source, false).unwrap();

        assert_eq!(
            formatted,
            "<project>\n    <name>demo</name>\n    <deps>\n        <dep id=\"a\"/>\n    </deps>\n</project>\n"
        );
    }

    #[test]
    fn test_strips_declaration() {
        let source = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root/>\n";
        let formatted = pretty_print(source, true).unwrap();

        assert!(!formatted.contains("<?xml"));
        assert!(formatted.contains("<root/>"));
    }

    #[test]
    fn test_keeps_declaration_when_asked() {
        let source = "<?xml version=\"1.0\"?><root/>";
        let formatted = pretty_print(source, false).unwrap();
        assert!(formatted.starts_with("<?xml version=\"1.0\"?>"));
    }

    #[test]
    fn test_preserves_comments() {
        let source = "<root><!-- keep me --><a/></root>";
        let formatted = pretty_print(source, true).unwrap();
        assert!(formatted.contains("<!-- keep me -->"));
    }

    #[test]
    fn test_mismatched_tags_error() {
        let result = pretty_print("<root><a></b></root>", true);
        assert!(matches!(result, Err(MarkupError::Parse { .. })));
    }
}
