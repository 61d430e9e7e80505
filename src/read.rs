use colored::Colorize;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::fastq::*;
use crate::locate::Hit;
use crate::watermark::DecodeResult;

/// Where a read ends up after demultiplexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Still moving through the pipeline.
    Pending,
    /// Could not be parsed or validated. Never written.
    Malformed(&'static str),
    /// Neither adapter was found.
    Unmatched,
    /// Longer than the read length cap, so never searched. Written with the unmatched reads.
    TooLong,
    /// Adapters were found but the tag could not be resolved.
    Unassigned,
    /// A barcode was resolved.
    Assigned,
    /// Shorter than the minimum output length after trimming. Never written.
    TooShort,
}

impl Status {
    /// Whether later pipeline stages should leave the read alone.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Status::Malformed(_) | Status::TooShort)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    Exact,
    Corrected(usize),
    Miss,
}

#[derive(Debug, Clone)]
pub struct Read {
    pub idx: usize,
    pub origin: Arc<Origin>,
    pub name: Vec<u8>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub avg_qual: u8,
    pub start_time: Instant,
    pub status: Status,
    pub reversed: bool,
    pub hit5: Option<Hit>,
    pub hit3: Option<Hit>,
    pub decoded: Option<DecodeResult>,
    pub barcode: Option<Vec<u8>>,
    pub correction: Option<Correction>,
    pub umi: Option<Vec<u8>>,
    pub tags: Vec<u8>,
}

impl Read {
    pub fn from_fastq(
        name: &[u8],
        seq: &[u8],
        qual: Option<&[u8]>,
        origin: Arc<Origin>,
        idx: usize,
    ) -> Self {
        let mut read = Self::empty(origin, idx);
        read.name = name.to_owned();
        read.seq = seq.to_ascii_uppercase();

        match qual {
            None => read.status = Status::Malformed("missing qualities"),
            Some(qual) if qual.len() != seq.len() => {
                read.status = Status::Malformed("sequence and quality lengths differ")
            }
            Some(_) if seq.is_empty() => read.status = Status::Malformed("empty sequence"),
            Some(qual) => {
                read.qual = qual.to_owned();
                if !read.seq.iter().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T' | b'N')) {
                    read.status = Status::Malformed("non-nucleotide characters in sequence");
                }
                read.avg_qual = average_qual(qual);
            }
        }

        read
    }

    /// Placeholder for a record the reader could not parse.
    pub fn malformed(origin: Arc<Origin>, idx: usize, reason: &'static str) -> Self {
        let mut read = Self::empty(origin, idx);
        read.status = Status::Malformed(reason);
        read
    }

    fn empty(origin: Arc<Origin>, idx: usize) -> Self {
        Self {
            idx,
            origin,
            name: Vec::new(),
            seq: Vec::new(),
            qual: Vec::new(),
            avg_qual: 0,
            start_time: Instant::now(),
            status: Status::Pending,
            reversed: false,
            hit5: None,
            hit3: None,
            decoded: None,
            barcode: None,
            correction: None,
            umi: None,
            tags: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Reverse complement the sequence and reverse the qualities in place.
    pub fn reverse_complement(&mut self) {
        self.seq = revcomp(&self.seq);
        self.qual.reverse();
        self.reversed = !self.reversed;
    }

    /// Remove `[start, end)` from the sequence and qualities.
    pub fn splice_out(&mut self, start: usize, end: usize) {
        let end = end.min(self.seq.len());
        let start = start.min(end);
        self.seq.drain(start..end);
        self.qual.drain(start..end);
    }

    /// Append a `KEY:TYPE:VALUE` tag to the header.
    pub fn push_tag(&mut self, key: &str, value: &[u8]) {
        if !self.tags.is_empty() {
            self.tags.push(b'\t');
        }
        self.tags.extend_from_slice(key.as_bytes());
        self.tags.push(b':');
        self.tags.extend_from_slice(value);
    }
}

/// Mean phred quality assuming the standard offset of 33.
pub fn average_qual(qual: &[u8]) -> u8 {
    if qual.is_empty() {
        return 0;
    }
    let sum = qual
        .iter()
        .map(|&q| q.saturating_sub(33) as usize)
        .sum::<usize>();
    (sum / qual.len()).min(u8::MAX as usize) as u8
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} (record {} in {})",
            std::str::from_utf8(&self.name).unwrap_or("?").bold(),
            self.idx,
            self.origin
        )?;

        let mut marks = vec![b' '; self.seq.len()];
        for (hit, c) in [(&self.hit5, b'5'), (&self.hit3, b'3')] {
            if let Some(hit) = hit {
                let end = hit.end.min(self.seq.len());
                marks[hit.start.min(end)..end].fill(c);
            }
        }
        writeln!(f, "  hits    {}", String::from_utf8_lossy(&marks))?;
        writeln!(f, "  seq     {}", String::from_utf8_lossy(&self.seq))?;
        writeln!(
            f,
            "  qual    {} (mean {})",
            String::from_utf8_lossy(&self.qual),
            self.avg_qual
        )?;

        if let Some(decoded) = &self.decoded {
            writeln!(
                f,
                "  decoded {} conf={:.3}",
                String::from_utf8_lossy(&decoded.tag).green(),
                decoded.confidence
            )?;
        }

        write!(f, "  status  {:?}", self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(seq: &[u8], qual: Option<&[u8]>) -> Read {
        Read::from_fastq(b"r", seq, qual, Arc::new(Origin::Bytes), 0)
    }

    #[test]
    fn validates_records() {
        assert_eq!(read(b"ACGT", Some(&b"IIII"[..])).status, Status::Pending);
        assert!(read(b"ACGT", None).status.is_dropped());
        assert!(read(b"ACGT", Some(&b"III"[..])).status.is_dropped());
        assert!(read(b"", Some(&b""[..])).status.is_dropped());
        assert!(read(b"ACXT", Some(&b"IIII"[..])).status.is_dropped());
        assert_eq!(read(b"acgt", Some(&b"IIII"[..])).seq, b"ACGT");
    }

    #[test]
    fn average_quality() {
        assert_eq!(read(b"ACGT", Some(&b"I+I+"[..])).avg_qual, 25);
        assert_eq!(average_qual(b""), 0);
    }

    #[test]
    fn reverse_and_splice() {
        let mut r = read(b"AACG", Some(&b"ABCD"[..]));
        r.reverse_complement();
        assert_eq!(r.seq, b"CGTT");
        assert_eq!(r.qual, b"DCBA");
        assert!(r.reversed);

        r.splice_out(1, 3);
        assert_eq!(r.seq, b"CT");
        assert_eq!(r.qual, b"DA");
    }

    #[test]
    fn header_tags() {
        let mut r = read(b"A", Some(&b"I"[..]));
        r.push_tag("BC:Z", b"GTCA");
        r.push_tag("CF:f", b"1.000");
        assert_eq!(r.tags, b"BC:Z:GTCA\tCF:f:1.000");
    }
}
