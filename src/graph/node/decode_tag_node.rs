use log::trace;
use thread_local::*;

use std::cell::RefCell;
use std::ops::Range;
use std::sync::Arc;

use crate::graph::*;
use crate::locate::*;
use crate::primers::*;
use crate::watermark::*;

pub struct DecodeTagNode {
    template: Arc<ChannelModel>,
    decoders: ThreadLocal<RefCell<WatermarkDecoder>>,
    five_prime: Arc<PrimerSet>,
    three_prime: Arc<PrimerSet>,
    min_confidence: f64,
}

impl DecodeTagNode {
    const NAME: &'static str = "DecodeTagNode";

    /// Decode the tag between the adapters of each matched read.
    ///
    /// Every thread gets its own decoder built from a copy of `template`. Reads with a
    /// confidence below `min_confidence` become unassigned.
    pub fn new(
        template: Arc<ChannelModel>,
        five_prime: Arc<PrimerSet>,
        three_prime: Arc<PrimerSet>,
        min_confidence: f64,
    ) -> Self {
        Self {
            template,
            decoders: ThreadLocal::new(),
            five_prime,
            three_prime,
            min_confidence,
        }
    }

    /// Part of the read holding the adapters and the tag.
    fn span(&self, read: &Read) -> Option<Range<usize>> {
        let extra = self.template.tag_len() + self.template.u();
        let len = read.len();
        match (&read.hit5, &read.hit3) {
            (Some(h5), Some(h3)) => Some(h5.start..h3.end.max(h5.end)),
            (Some(h5), None) => {
                Some(h5.start..(h5.end + extra + self.three_prime.max_len()).min(len))
            }
            (None, Some(h3)) => {
                Some(h3.start.saturating_sub(extra + self.five_prime.max_len())..h3.end)
            }
            (None, None) => None,
        }
    }
}

/// Primer bases that are inside the read.
fn aligned_primer<'a>(primers: &'a PrimerSet, hit: &Hit) -> &'a [u8] {
    let seq = primers.seq(hit.primer, hit.reverse);
    match hit.cigar.ops() {
        [(EditOp::Overhang, n), ..] => &seq[*n..],
        [.., (EditOp::Overhang, n)] => &seq[..seq.len() - n],
        _ => seq,
    }
}

impl GraphNode for DecodeTagNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        let Some(mut read) = read else { panic!("Expected some read!") };
        if read.status != Status::Pending {
            return Ok((Some(read), false));
        }
        let Some(span) = self.span(&read) else {
            return Ok((Some(read), false));
        };

        let adapter5 = read
            .hit5
            .as_ref()
            .map_or(&[][..], |h| aligned_primer(&self.five_prime, h));
        let adapter3 = read
            .hit3
            .as_ref()
            .map_or(&[][..], |h| aligned_primer(&self.three_prime, h));

        let decoder = self
            .decoders
            .get_or(|| RefCell::new(WatermarkDecoder::new((*self.template).clone())));
        let mut res = decoder.borrow_mut().decode(
            &read.seq[span.clone()],
            &read.qual[span.clone()],
            adapter5,
            adapter3,
        );

        // report positions in read coordinates
        res.offset += span.start;
        res.best5p = res.best5p.map(|p| p + span.start);
        res.best3p = res.best3p.map(|p| p + span.start);

        trace!(
            "read {}: tag {} confidence {:.4} at {}",
            read.idx,
            String::from_utf8_lossy(&res.tag),
            res.confidence,
            res.offset
        );

        if res.is_confident(self.min_confidence) {
            read.barcode = Some(res.tag.clone());
            read.status = Status::Assigned;
        } else {
            read.status = Status::Unassigned;
        }
        read.decoded = Some(res);

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

    fn node(min_confidence: f64) -> DecodeTagNode {
        let mut params = ChannelParams::new(4, 4, 4);
        params.u = 1;
        let model = ChannelModel::new(params).unwrap();
        let p5 = PrimerSet::new("5'", vec![Primer::new("p5", "AATT")]).unwrap();
        let p3 = PrimerSet::new("3'", vec![Primer::new("p3", "TTAA")]).unwrap();
        DecodeTagNode::new(Arc::new(model), Arc::new(p5), Arc::new(p3), min_confidence)
    }

    fn hit(start: usize, end: usize) -> Hit {
        Hit {
            primer: 0,
            start,
            end,
            reverse: false,
            dist: 0,
            overhang: 0,
            cigar: Cigar::default(),
        }
    }

    fn read(seq: &[u8], hit5: Option<Hit>, hit3: Option<Hit>) -> Read {
        let qual = vec![b'I'; seq.len()];
        let mut read = Read::from_fastq(b"r", seq, Some(&qual[..]), Arc::new(Origin::Bytes), 0);
        read.hit5 = hit5;
        read.hit3 = hit3;
        read
    }

    #[test]
    fn assigns_confident_tags() {
        let r = read(b"CCAATTGTCATTAACC", Some(hit(2, 6)), Some(hit(10, 14)));
        let (out, _) = node(0.5).run(Some(r)).unwrap();
        let out = out.unwrap();

        assert_eq!(out.status, Status::Assigned);
        assert_eq!(out.barcode.as_deref(), Some(&b"GTCA"[..]));
        let decoded = out.decoded.unwrap();
        assert_eq!(decoded.offset, 6);
        assert_eq!(decoded.best5p, Some(6));
        assert_eq!(decoded.best3p, Some(10));
    }

    #[test]
    fn one_sided_span() {
        let r = read(b"CCAATTGTCATTAACC", Some(hit(2, 6)), None);
        let (out, _) = node(0.5).run(Some(r)).unwrap();
        assert_eq!(out.unwrap().barcode.as_deref(), Some(&b"GTCA"[..]));
    }

    #[test]
    fn low_confidence_is_unassigned() {
        // the tag is cut short, so nothing decodes
        let r = read(b"CCAATTGTC", Some(hit(2, 6)), None);
        let (out, _) = node(0.5).run(Some(r)).unwrap();
        let out = out.unwrap();
        assert_eq!(out.status, Status::Unassigned);
        assert!(out.barcode.is_none());
    }

    #[test]
    fn partial_primers_are_clipped() {
        let set = PrimerSet::new("5'", vec![Primer::new("p", "ACGTAC")]).unwrap();
        let mut h = hit(0, 4);
        h.cigar.push(EditOp::Overhang, 2);
        h.cigar.push(EditOp::Match, 4);
        assert_eq!(aligned_primer(&set, &h), b"GTAC");

        let mut h = hit(10, 14);
        h.cigar.push(EditOp::Match, 4);
        h.cigar.push(EditOp::Overhang, 2);
        assert_eq!(aligned_primer(&set, &h), b"ACGT");
    }
}
