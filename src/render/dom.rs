//! Structural queries over a rendered page
//!
//! `Page` owns the parsed document and is not `Send`; build it from a
//! [`RenderedPage`](super::RenderedPage) inside synchronous code and drop it
//! before the next await point.

use scraper::{ElementRef, Html, Selector};

/// A parsed document supporting CSS selector queries
pub struct Page {
    url: String,
    document: Html,
}

/// One element of a parsed [`Page`]
#[derive(Clone, Copy)]
pub struct Node<'a> {
    element: ElementRef<'a>,
}

/// Parses a selector, logging and returning None when it is invalid
fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Invalid selector '{}': {:?}", selector, e);
            None
        }
    }
}

impl Page {
    /// Parses an HTML document
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Html::parse_document(html),
        }
    }

    /// URL the page was rendered from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns every element matching `selector`, in document order
    ///
    /// An invalid selector matches nothing.
    pub fn query_all(&self, selector: &str) -> Vec<Node<'_>> {
        let Some(parsed) = parse_selector(selector) else {
            return Vec::new();
        };
        self.document
            .select(&parsed)
            .map(|element| Node { element })
            .collect()
    }

    /// Returns the first element matching `selector`
    pub fn query(&self, selector: &str) -> Option<Node<'_>> {
        self.query_all(selector).into_iter().next()
    }

    /// Text content of the whole body
    pub fn body_text(&self) -> String {
        match self.query("body") {
            Some(body) => body.text_content(),
            None => self.document.root_element().text().collect(),
        }
    }
}

impl<'a> Node<'a> {
    /// Concatenated text of this element and its descendants, untrimmed
    pub fn text_content(&self) -> String {
        self.element.text().collect()
    }

    /// Trimmed text content
    pub fn text(&self) -> String {
        self.text_content().trim().to_string()
    }

    /// Value of an attribute, if set
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Lowercase tag name
    pub fn tag_name(&self) -> &'a str {
        self.element.value().name()
    }

    /// Returns every descendant matching `selector`, in document order
    pub fn query_all(&self, selector: &str) -> Vec<Node<'a>> {
        let Some(parsed) = parse_selector(selector) else {
            return Vec::new();
        };
        self.element
            .select(&parsed)
            .map(|element| Node { element })
            .collect()
    }

    /// Returns the first descendant matching `selector`
    pub fn query(&self, selector: &str) -> Option<Node<'a>> {
        self.query_all(selector).into_iter().next()
    }

    /// Every descendant element, in document order
    pub fn descendants(&self) -> Vec<Node<'a>> {
        self.element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .map(|element| Node { element })
            .collect()
    }
}
