use log::trace;

use std::sync::Arc;

use crate::graph::*;
use crate::read::Correction;
use crate::whitelist::*;

pub struct CorrectBarcodeNode {
    whitelist: Arc<Whitelist>,
    on_miss: OnMiss,
}

impl CorrectBarcodeNode {
    const NAME: &'static str = "CorrectBarcodeNode";

    /// Snap decoded barcodes to the closest whitelist entry.
    ///
    /// Barcodes without a unique close entry are kept or made unassigned depending on `on_miss`.
    pub fn new(whitelist: Arc<Whitelist>, on_miss: OnMiss) -> Self {
        Self { whitelist, on_miss }
    }
}

impl GraphNode for CorrectBarcodeNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        let Some(mut read) = read else { panic!("Expected some read!") };
        if read.status != Status::Assigned {
            return Ok((Some(read), false));
        }
        let Some(barcode) = read.barcode.as_deref() else {
            return Ok((Some(read), false));
        };

        match self.whitelist.correct(barcode) {
            WhitelistMatch::Exact => read.correction = Some(Correction::Exact),
            WhitelistMatch::Corrected { barcode, dist } => {
                trace!(
                    "read {}: corrected {} to {}",
                    read.idx,
                    String::from_utf8_lossy(read.barcode.as_deref().unwrap_or_default()),
                    String::from_utf8_lossy(barcode)
                );
                read.barcode = Some(barcode.to_owned());
                read.correction = Some(Correction::Corrected(dist));
            }
            WhitelistMatch::Miss => {
                read.correction = Some(Correction::Miss);
                if self.on_miss == OnMiss::Unassigned {
                    read.status = Status::Unassigned;
                    read.barcode = None;
                }
            }
        }

        Ok((Some(read), false))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastq::Origin;

    fn assigned(barcode: &[u8]) -> Read {
        let mut read = Read::from_fastq(b"r", b"ACGT", Some(&b"IIII"[..]), Arc::new(Origin::Bytes), 0);
        read.barcode = Some(barcode.to_owned());
        read.status = Status::Assigned;
        read
    }

    fn run(node: &CorrectBarcodeNode, read: Read) -> Read {
        node.run(Some(read)).unwrap().0.unwrap()
    }

    #[test]
    fn corrects_against_whitelist() {
        let whitelist = Arc::new(Whitelist::from_text(b"GTCA\nAACC\n", 1).unwrap());
        let node = CorrectBarcodeNode::new(whitelist, OnMiss::Keep);

        let out = run(&node, assigned(b"GTCA"));
        assert_eq!(out.correction, Some(Correction::Exact));

        let out = run(&node, assigned(b"GTCT"));
        assert_eq!(out.correction, Some(Correction::Corrected(1)));
        assert_eq!(out.barcode.as_deref(), Some(&b"GTCA"[..]));

        let out = run(&node, assigned(b"TTTT"));
        assert_eq!(out.correction, Some(Correction::Miss));
        assert_eq!(out.status, Status::Assigned);
        assert_eq!(out.barcode.as_deref(), Some(&b"TTTT"[..]));
    }

    #[test]
    fn misses_can_be_unassigned() {
        let whitelist = Arc::new(Whitelist::from_text(b"GTCA\n", 1).unwrap());
        let node = CorrectBarcodeNode::new(whitelist, OnMiss::Unassigned);

        let out = run(&node, assigned(b"TTTT"));
        assert_eq!(out.status, Status::Unassigned);
        assert!(out.barcode.is_none());

        let mut unmatched = assigned(b"GTCA");
        unmatched.status = Status::Unmatched;
        assert!(run(&node, unmatched).correction.is_none());
    }
}
