use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use triple_accel::levenshtein::levenshtein_simd_k;

use crate::errors::*;
use crate::parse_utils::*;

/// What to do with a tag that has no unique whitelist match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMiss {
    /// Keep the decoded tag as the barcode.
    #[default]
    Keep,
    /// Route the read to the unassigned bucket.
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistMatch<'a> {
    Exact,
    Corrected { barcode: &'a [u8], dist: usize },
    Miss,
}

/// Known barcodes, with correction of tags to the unique nearest barcode.
#[derive(Debug, Clone)]
pub struct Whitelist {
    barcodes: Vec<Vec<u8>>,
    lookup: FxHashSet<Vec<u8>>,
    max_dist: usize,
}

impl Whitelist {
    /// Barcodes are also bucket and file names, so they must be plain nucleotides.
    pub fn new(barcodes: impl IntoIterator<Item = Vec<u8>>, max_dist: usize) -> Result<Self> {
        let mut lookup = FxHashSet::default();
        let mut res = Vec::new();
        for b in barcodes {
            let b = b.to_ascii_uppercase();
            if b.is_empty() || !b.iter().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T' | b'N')) {
                return Err(Error::Parse {
                    string: utf8(&b),
                    context: "whitelist".to_owned(),
                    reason: "barcodes must only contain A, C, G, T or N",
                });
            }
            if lookup.insert(b.clone()) {
                res.push(b);
            }
        }
        Ok(Self {
            barcodes: res,
            lookup,
            max_dist,
        })
    }

    /// One barcode per line; blank lines and `#` comments are skipped.
    pub fn from_text(text: &[u8], max_dist: usize) -> Result<Self> {
        Self::new(content_lines(text).map(|l| l.to_owned()), max_dist)
    }

    pub fn from_file(file: &str, max_dist: usize) -> Result<Self> {
        Self::from_text(&read_file(file)?, max_dist)
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }

    pub fn correct(&self, tag: &[u8]) -> WhitelistMatch<'_> {
        if self.lookup.contains(tag) {
            return WhitelistMatch::Exact;
        }

        let mut best: Option<(usize, &[u8])> = None;
        let mut tied = false;
        for b in &self.barcodes {
            let Some(d) = bounded_levenshtein(tag, b, self.max_dist) else {
                continue;
            };
            match best {
                Some((bd, _)) if d > bd => (),
                Some((bd, _)) if d == bd => tied = true,
                _ => {
                    best = Some((d, b.as_slice()));
                    tied = false;
                }
            }
        }

        match best {
            Some((dist, barcode)) if !tied => WhitelistMatch::Corrected { barcode, dist },
            _ => WhitelistMatch::Miss,
        }
    }
}

/// Edit distance between `a` and `b` if it is at most `max`.
fn bounded_levenshtein(a: &[u8], b: &[u8], max: usize) -> Option<usize> {
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let k = u32::try_from(max).unwrap_or(u32::MAX);
    levenshtein_simd_k(a, b, k).map(|d| d as usize)
}
