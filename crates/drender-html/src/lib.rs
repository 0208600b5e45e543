//! d-render HTML loader
//!
//! Builds a [`drender_dom::Document`] from markup using html5ever.

mod parser;

pub use parser::{HtmlParser, set_inner_html};

use thiserror::Error;

/// Markup loading error
#[derive(Debug, Error)]
pub enum HtmlError {
    #[error("failed to read markup: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dom(#[from] drender_dom::DomError),

    #[error("parsed markup has no <body>")]
    MissingBody,
}

/// Parse an HTML string into a Document
pub fn parse(html: &str) -> Result<drender_dom::Document, HtmlError> {
    HtmlParser::new().parse(html)
}
