//! Lightweight favicon `<link>` scanner
//!
//! This is a line-oriented substring scanner, not an HTML parser. It only
//! looks inside the document head and stops at the first `</head>`.

use crate::errors::{ExtractError, ExtractResult};

/// `rel` values recognised as favicon declarations, matched case-sensitively
pub const FAVICON_RELATIONS: [&str; 4] = [
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
];

const HEAD_END: &str = "</head>";
const HREF_ATTR: &str = "href=\"";

/// Find the favicon reference declared by an HTML document
///
/// Returns the raw `href` value, which may be relative.
pub fn extract_favicon_url(html: &str) -> ExtractResult<String> {
    extract_favicon_url_from_lines(html.lines())
}

/// Scan lines in order; the first favicon `<link>` before `</head>` wins
pub fn extract_favicon_url_from_lines<'a, I>(lines: I) -> ExtractResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    for (index, line) in lines.into_iter().enumerate() {
        let head_end = line.find(HEAD_END);
        let searchable = match head_end {
            Some(pos) => &line[..pos],
            None => line,
        };

        if let Some(rel_pos) = first_relation_match(searchable) {
            let tag = enclosing_tag(searchable, rel_pos);
            return href_value(tag).ok_or(ExtractError::MalformedLink { line: index + 1 });
        }

        if head_end.is_some() {
            return Err(ExtractError::NotFound { head_closed: true });
        }
    }

    Err(ExtractError::NotFound { head_closed: false })
}

/// Byte offset of the earliest `rel="<relation>"` or `rel='<relation>'` in `line`
fn first_relation_match(line: &str) -> Option<usize> {
    FAVICON_RELATIONS
        .iter()
        .flat_map(|relation| {
            [
                format!("rel=\"{relation}\""),
                format!("rel='{relation}'"),
            ]
        })
        .filter_map(|needle| line.find(&needle))
        .min()
}

/// The `<...>` segment around `pos`, clipped to the line when the tag spans lines
fn enclosing_tag(line: &str, pos: usize) -> &str {
    let start = line[..pos].rfind('<').unwrap_or(0);
    let end = line[pos..]
        .find('>')
        .map(|offset| pos + offset + 1)
        .unwrap_or(line.len());
    &line[start..end]
}

fn href_value(tag: &str) -> Option<String> {
    let start = tag.find(HREF_ATTR)? + HREF_ATTR.len();
    let len = tag[start..].find('"')?;
    let value = &tag[start..start + len];
    if value.trim().is_empty() {
        return None;
    }
    Some(value.to_string())
}
