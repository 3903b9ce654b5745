//! HTML link discovery and in-place rewriting.
//!
//! Both passes stream the page through `lol_html` with the same selectors,
//! so a [`LinkSite`] recorded while scanning names the same attribute (or
//! `<style>` `url(...)` occurrence) when rewriting. Bytes outside rewritten
//! values are emitted unchanged.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::LazyLock;

use html_escape::decode_html_entities;
use lol_html::errors::RewritingError;
use lol_html::html_content::ContentType;
use lol_html::{HtmlRewriter, Settings, element, text};
use regex::Regex;
use thiserror::Error;

/// Elements and attributes that carry fetchable references.
const LINK_ATTRIBUTES: [(&str, &str); 4] = [
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("img[src]", "src"),
    ("script[src]", "src"),
];

/// `url(...)` inside CSS; group 1 is the reference without quotes.
#[allow(clippy::expect_used)]
static CSS_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]*?)['"]?\s*\)"#).expect("CSS url regex is valid") // Static pattern, safe to panic
});

/// Where a reference lives in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSite {
    /// The link attribute of the n-th link-bearing element.
    Attribute {
        /// Document-order index among link-bearing elements.
        element: usize,
    },
    /// The n-th `url(...)` of the m-th `<style>` text.
    StyleUrl {
        /// Document-order index of the `<style>` element.
        style: usize,
        /// Index of the `url(...)` within that style text.
        occurrence: usize,
    },
}

/// A reference found in the page, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    /// Location for the rewrite pass.
    pub site: LinkSite,
    /// Owning element name (`a`, `img`, `style`, …).
    pub tag: String,
    /// `href`, `src`, or `url()` for CSS references.
    pub attribute: &'static str,
    /// The value as written, entity-decoded.
    pub raw_value: String,
}

/// The page could not be streamed through the HTML rewriter.
#[derive(Debug, Error)]
#[error("failed to process HTML document: {source}")]
pub struct DocumentError {
    #[source]
    source: RewritingError,
}

impl DocumentError {
    fn new(source: RewritingError) -> Self {
        Self { source }
    }
}

/// Lists every link-bearing attribute and CSS `url(...)` in `html`, in
/// document order.
///
/// # Errors
///
/// Returns [`DocumentError`] if the rewriter rejects the input.
pub fn discover_links(html: &[u8]) -> Result<Vec<LinkReference>, DocumentError> {
    let found = RefCell::new(Vec::new());
    let next_element = Cell::new(0usize);
    let next_style = Cell::new(0usize);
    let style_text = RefCell::new(String::new());

    {
        let found = &found;
        let next_element = &next_element;
        let next_style = &next_style;
        let style_text = &style_text;

        let mut handlers = Vec::with_capacity(LINK_ATTRIBUTES.len() + 1);
        for (selector, attribute) in LINK_ATTRIBUTES {
            handlers.push(element!(selector, move |el| {
                let ordinal = next_element.get();
                next_element.set(ordinal + 1);
                if let Some(value) = el.get_attribute(attribute) {
                    found.borrow_mut().push(LinkReference {
                        site: LinkSite::Attribute { element: ordinal },
                        tag: el.tag_name(),
                        attribute,
                        raw_value: decode_html_entities(&value).into_owned(),
                    });
                }
                Ok(())
            }));
        }
        handlers.push(text!("style", move |chunk| {
            style_text.borrow_mut().push_str(chunk.as_str());
            if chunk.last_in_text_node() {
                let css = std::mem::take(&mut *style_text.borrow_mut());
                let style = next_style.get();
                next_style.set(style + 1);
                let mut found = found.borrow_mut();
                for (occurrence, capture) in css_urls(&css).enumerate() {
                    found.push(LinkReference {
                        site: LinkSite::StyleUrl { style, occurrence },
                        tag: "style".to_string(),
                        attribute: "url()",
                        raw_value: capture.as_str().trim().to_string(),
                    });
                }
            }
            Ok(())
        }));

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |_: &[u8]| {},
        );
        rewriter.write(html).map_err(DocumentError::new)?;
        rewriter.end().map_err(DocumentError::new)?;
    }

    Ok(found.into_inner())
}

/// Rewrites the references named in `replacements`, returning the new page
/// and how many references changed.
///
/// # Errors
///
/// Returns [`DocumentError`] if the rewriter rejects the input.
pub fn rewrite_links(
    html: &[u8],
    replacements: &HashMap<LinkSite, String>,
) -> Result<(Vec<u8>, usize), DocumentError> {
    let mut output = Vec::with_capacity(html.len());
    let rewritten = Cell::new(0usize);
    let next_element = Cell::new(0usize);
    let next_style = Cell::new(0usize);
    let style_text = RefCell::new(String::new());

    {
        let rewritten = &rewritten;
        let next_element = &next_element;
        let next_style = &next_style;
        let style_text = &style_text;

        let mut handlers = Vec::with_capacity(LINK_ATTRIBUTES.len() + 1);
        for (selector, attribute) in LINK_ATTRIBUTES {
            handlers.push(element!(selector, move |el| {
                let ordinal = next_element.get();
                next_element.set(ordinal + 1);
                if let Some(local) = replacements.get(&LinkSite::Attribute { element: ordinal }) {
                    el.set_attribute(attribute, local)?;
                    rewritten.set(rewritten.get() + 1);
                }
                Ok(())
            }));
        }
        handlers.push(text!("style", move |chunk| {
            style_text.borrow_mut().push_str(chunk.as_str());
            if !chunk.last_in_text_node() {
                // Re-emitted in full with the last chunk.
                chunk.remove();
                return Ok(());
            }

            let css = std::mem::take(&mut *style_text.borrow_mut());
            let style = next_style.get();
            next_style.set(style + 1);

            let mut out = String::with_capacity(css.len());
            let mut cursor = 0;
            for (occurrence, capture) in css_urls(&css).enumerate() {
                if let Some(local) = replacements.get(&LinkSite::StyleUrl { style, occurrence }) {
                    out.push_str(&css[cursor..capture.start()]);
                    out.push_str(local);
                    cursor = capture.end();
                    rewritten.set(rewritten.get() + 1);
                }
            }
            out.push_str(&css[cursor..]);
            chunk.replace(&out, ContentType::Html);
            Ok(())
        }));

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(html).map_err(DocumentError::new)?;
        rewriter.end().map_err(DocumentError::new)?;
    }

    Ok((output, rewritten.get()))
}

/// The reference span of every `url(...)` in `css`.
fn css_urls(css: &str) -> impl Iterator<Item = regex::Match<'_>> {
    CSS_URL_PATTERN
        .captures_iter(css)
        .filter_map(|captures| captures.get(1))
}
