use std::fmt;
use std::io::Write;

/// Where a read came from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(String),
    Bytes,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Origin::*;
        match self {
            File(file) => write!(f, "file \"{}\"", file),
            Bytes => write!(f, "bytes"),
        }
    }
}

/// Write one four-line fastq record. Extra header tags are separated from the name by a space.
pub fn write_fastq_record(
    writer: &mut (dyn Write + Send),
    name: &[u8],
    tags: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> std::io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(name)?;
    if !tags.is_empty() {
        writer.write_all(b" ")?;
        writer.write_all(tags)?;
    }
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")
}

pub fn complement(b: u8) -> u8 {
    match b {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let mut out = Vec::new();
        write_fastq_record(&mut out, b"read1", b"BC:Z:ACGT", b"ACGT", b"IIII").unwrap();
        assert_eq!(out, b"@read1 BC:Z:ACGT\nACGT\n+\nIIII\n");

        out.clear();
        write_fastq_record(&mut out, b"read2", b"", b"A", b"#").unwrap();
        assert_eq!(out, b"@read2\nA\n+\n#\n");
    }

    #[test]
    fn reverse_complement() {
        assert_eq!(revcomp(b"AACGTN"), b"NACGTT");
        assert_eq!(revcomp(b"AATT"), b"AATT");
    }
}
