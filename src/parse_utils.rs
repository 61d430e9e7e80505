use memchr::memchr_iter;

use crate::errors::*;

pub fn trim_ascii_whitespace(b: &[u8]) -> Option<&[u8]> {
    let start = b.iter().position(|&c| !c.is_ascii_whitespace())?;
    let end = b.iter().rposition(|&c| !c.is_ascii_whitespace())?;
    Some(&b[start..=end])
}

/// Non-empty, trimmed lines that are not `#` comments.
pub fn content_lines(text: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0;
    memchr_iter(b'\n', text)
        .chain(std::iter::once(text.len()))
        .filter_map(move |end| {
            let line = &text[start.min(end)..end];
            start = end + 1;
            trim_ascii_whitespace(line)
        })
        .filter(|line| !line.starts_with(b"#"))
}

/// Whitespace separated numbers, one table row per line.
pub fn parse_table(text: &[u8], context: &str) -> Result<Vec<Vec<f64>>> {
    content_lines(text)
        .map(|line| {
            line.split(|c| c.is_ascii_whitespace())
                .filter(|field| !field.is_empty())
                .map(|field| {
                    std::str::from_utf8(field)
                        .ok()
                        .and_then(|s| s.parse::<f64>().ok())
                        .ok_or_else(|| Error::Parse {
                            string: utf8(field),
                            context: context.to_owned(),
                            reason: "expected a number",
                        })
                })
                .collect()
        })
        .collect()
}

pub fn read_file(file: &str) -> Result<Vec<u8>> {
    std::fs::read(file).map_err(|e| Error::FileIo {
        file: file.to_owned(),
        source: Box::new(e),
    })
}
