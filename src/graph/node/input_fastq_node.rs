use log::warn;
use needletail::errors::ParseErrorKind;
use needletail::*;

use thread_local::*;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::fastq::Origin;
use crate::graph::*;

const CHUNK_SIZE: usize = 256;
/// Parse errors in a row after which the parser is assumed to be stuck.
const MAX_ERRORS_IN_A_ROW: usize = 64;

struct Reader {
    inner: Box<dyn FastxReader>,
    errors_in_a_row: usize,
}

pub struct InputFastqNode {
    // `None` once the input is exhausted or can no longer be parsed
    reader: Mutex<Option<Reader>>,
    buf: ThreadLocal<RefCell<VecDeque<Read>>>,
    origin: Arc<Origin>,
    idx: AtomicUsize,
    truncated: AtomicBool,
}

impl InputFastqNode {
    const NAME: &'static str = "InputFastqNode";

    /// Stream reads created from fastq records from an input file, plain or gzipped.
    pub fn new(file: impl AsRef<str>) -> Result<Self> {
        let file = file.as_ref();
        let reader = match parse_fastx_file(file) {
            Ok(r) => Some(r),
            Err(e) if e.kind == ParseErrorKind::EmptyFile => None,
            Err(e) => {
                return Err(Error::FileIo {
                    file: file.to_owned(),
                    source: Box::new(e),
                })
            }
        };

        Ok(Self::with_reader(reader, Origin::File(file.to_owned())))
    }

    /// Stream reads created from fastq records held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let reader = match parse_fastx_reader(Cursor::new(bytes)) {
            Ok(r) => Some(r),
            Err(e) if e.kind == ParseErrorKind::EmptyFile => None,
            Err(e) => return Err(Error::BytesIo(Box::new(e))),
        };

        Ok(Self::with_reader(reader, Origin::Bytes))
    }

    fn with_reader(reader: Option<Box<dyn FastxReader>>, origin: Origin) -> Self {
        Self {
            reader: Mutex::new(reader.map(|inner| Reader {
                inner,
                errors_in_a_row: 0,
            })),
            buf: ThreadLocal::new(),
            origin: Arc::new(origin),
            idx: AtomicUsize::new(0),
            truncated: AtomicBool::new(false),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Whether reading stopped before the end of the input because the parser got stuck.
    pub fn truncated(&self) -> bool {
        self.truncated.load(Ordering::Relaxed)
    }

    fn fill(&self, b: &mut VecDeque<Read>) {
        let mut guard = self.reader.lock().unwrap();
        let Some(reader) = guard.as_mut() else {
            return;
        };

        for _ in 0..CHUNK_SIZE {
            let Some(record) = reader.inner.next() else {
                *guard = None;
                return;
            };
            let idx = self.idx.fetch_add(1, Ordering::Relaxed);

            match record {
                Ok(record) => {
                    reader.errors_in_a_row = 0;
                    b.push_back(Read::from_fastq(
                        record.id(),
                        &record.seq(),
                        record.qual(),
                        Arc::clone(&self.origin),
                        idx,
                    ));
                }
                Err(e) => {
                    warn!(
                        "{}",
                        Error::ParseRecord {
                            origin: (*self.origin).clone(),
                            idx,
                            source: Box::new(e),
                        }
                    );
                    b.push_back(Read::malformed(
                        Arc::clone(&self.origin),
                        idx,
                        "unparsable record",
                    ));

                    reader.errors_in_a_row += 1;
                    if reader.errors_in_a_row >= MAX_ERRORS_IN_A_ROW {
                        warn!(
                            "Giving up on {} after {} unparsable records in a row",
                            self.origin, reader.errors_in_a_row
                        );
                        self.truncated.store(true, Ordering::Relaxed);
                        *guard = None;
                        return;
                    }
                }
            }
        }
    }
}

impl GraphNode for InputFastqNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        assert!(read.is_none(), "Expected no input reads for {}", Self::NAME);

        let buf = self
            .buf
            .get_or(|| RefCell::new(VecDeque::with_capacity(CHUNK_SIZE)));
        let mut b = buf.borrow_mut();

        if b.is_empty() {
            self.fill(&mut b);
        }

        if b.is_empty() {
            return Ok((None, true));
        }

        Ok((b.pop_front(), false))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_records_and_flags_bad_ones() {
        let node = InputFastqNode::from_bytes(
            b"@a\nACGT\n+\nIIII\n@b\nAXGT\n+\nIIII\n@c\nACG\n+\nIIII\n".to_vec(),
        )
        .unwrap();

        let mut reads = Vec::new();
        loop {
            let (read, done) = node.run(None).unwrap();
            if done {
                break;
            }
            reads.extend(read);
        }

        assert_eq!(reads.len(), 3);
        assert_eq!(reads[0].name, b"a");
        assert_eq!(reads[0].status, Status::Pending);
        assert_eq!(reads[1].status, Status::Malformed("non-nucleotide characters in sequence"));
        // unequal lengths are either a parse error or caught when validating
        assert_eq!(reads[2].idx, 2);
        assert!(reads[2].status.is_dropped());
    }

    #[test]
    fn keeps_reading_after_a_bad_record() {
        let node = InputFastqNode::from_bytes(
            b"@a\nACGTACGT\n+\nIIIIIIII\n@b\nACGTACGT\n+\nIIII\n@c\nGGGG\n+\nIIII\n@d\nTTTT\n+\nIIII\n"
                .to_vec(),
        )
        .unwrap();

        let mut reads = Vec::new();
        loop {
            let (read, done) = node.run(None).unwrap();
            if done {
                break;
            }
            reads.extend(read);
        }

        assert_eq!(reads.len(), 4);
        assert!(reads[1].status.is_dropped());
        assert_eq!(reads[2].name, b"c");
        assert_eq!(reads[2].status, Status::Pending);
        assert_eq!(reads[3].name, b"d");
        assert_eq!(reads[3].idx, 3);
        assert!(!node.truncated());
    }

    #[test]
    fn empty_input() {
        let node = InputFastqNode::from_bytes(Vec::new()).unwrap();
        assert!(node.run(None).unwrap().1);
    }
}
