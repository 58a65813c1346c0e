//! Text extraction from uploaded files

mod extractor;
mod parser;

pub use extractor::{extension_of, ExtractorRegistry, TextExtractor};
pub use parser::{CsvExtractor, DocxExtractor, HtmlExtractor, PdfExtractor, PlainTextExtractor};
