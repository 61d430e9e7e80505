//! Approximate search for primers near the ends of reads.

use bio::alignment::{Alignment, AlignmentOperation};
use bio::pattern_matching::myers::MyersBuilder;

use std::fmt;
use std::ops::Range;

use crate::primers::*;

pub use Threshold::*;

/// Either a count or a fraction.
///
/// Used for the edit distance budget of a primer. The fraction is of the length of the primer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Threshold {
    Count(usize),
    Frac(f64),
}

impl Threshold {
    pub fn get(&self, len: usize) -> usize {
        match self {
            Count(c) => *c,
            Frac(f) => (*f * (len as f64)) as usize,
        }
    }
}

impl From<f64> for Threshold {
    /// Values below one are fractions, everything else is a count rounded to the nearest integer.
    ///
    /// Negative values become `Frac(0.0)`. Values that are not finite must be rejected before
    /// getting here; NaN becomes `Frac(0.0)` and infinity saturates.
    fn from(x: f64) -> Self {
        if x.is_nan() {
            Frac(0.0)
        } else if x < 1.0 {
            Frac(x.max(0.0))
        } else {
            Count(x.round() as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Match,
    Mismatch,
    /// Read base that is not in the primer.
    Ins,
    /// Primer base that is not in the read.
    Del,
    /// Primer bases past the end of the read.
    Overhang,
}

impl EditOp {
    pub fn symbol(&self) -> char {
        use EditOp::*;
        match self {
            Match => '=',
            Mismatch => 'X',
            Ins => 'I',
            Del => 'D',
            Overhang => 'H',
        }
    }
}

/// Run-length encoded edit script, primer start to primer end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cigar(Vec<(EditOp, usize)>);

impl Cigar {
    pub fn push(&mut self, op: EditOp, count: usize) {
        if count == 0 {
            return;
        }
        match self.0.last_mut() {
            Some((last, c)) if *last == op => *c += count,
            _ => self.0.push((op, count)),
        }
    }

    pub fn ops(&self) -> &[(EditOp, usize)] {
        &self.0
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (op, count) in &self.0 {
            write!(f, "{}{}", count, op.symbol())?;
        }
        Ok(())
    }
}

/// Approximate occurrence of a primer in a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Index of the primer in its sorted set.
    pub primer: usize,
    pub start: usize,
    pub end: usize,
    /// The reverse complement of the primer matched.
    pub reverse: bool,
    pub dist: usize,
    /// Primer bases cut off by the start or end of the read.
    pub overhang: usize,
    pub cigar: Cigar,
}

impl Hit {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateOpts {
    pub max_edit_distance: Threshold,
    /// Allow primers to hang off the ends of reads.
    pub partial_ends: bool,
    /// Smallest fraction of a primer that must align when it hangs off a read end.
    pub partial_min_frac: f64,
    /// Number of bases at each end of a read that are searched.
    pub end_window: usize,
}

impl Default for LocateOpts {
    fn default() -> Self {
        Self {
            max_edit_distance: Frac(0.2),
            partial_ends: false,
            partial_min_frac: 0.5,
            end_window: 200,
        }
    }
}

/// Pads the text where a primer may hang off the read. Matches every primer base.
const PAD: u8 = b'*';

/// Which end of the searched text a primer may hang off.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Overhang {
    None,
    Start(usize),
    End(usize),
}

struct Aln {
    start: usize,
    end: usize,
    dist: usize,
    overhang: usize,
    cigar: Cigar,
}

/// Every alignment of the whole `pattern` against a substring of `text` within `budget`.
///
/// With an overhang allowed, `text` is padded with wildcards on that side so a prefix or suffix
/// of the pattern can run off the text. At least `min_aligned` pattern bases must then land in
/// the text, and the budget is scaled down to the aligned length.
fn align(pattern: &[u8], text: &[u8], budget: usize, overhang: Overhang, mut found: impl FnMut(Aln)) {
    let m = pattern.len();
    if m == 0 || m > MAX_PRIMER_LEN {
        return;
    }

    let pad = match overhang {
        Overhang::None => 0,
        Overhang::Start(min_aligned) | Overhang::End(min_aligned) => m - min_aligned.clamp(1, m),
    };
    let padded;
    let (text, lo, hi) = match overhang {
        Overhang::Start(_) if pad > 0 => {
            padded = [&vec![PAD; pad][..], text].concat();
            (&padded[..], pad, pad + text.len())
        }
        Overhang::End(_) if pad > 0 => {
            padded = [text, &vec![PAD; pad][..]].concat();
            (&padded[..], 0, text.len())
        }
        _ => (text, 0, text.len()),
    };

    let mut myers = MyersBuilder::new()
        .ambig(b'N', b"ACGTN")
        .text_wildcard(PAD)
        .build_64(pattern);
    let max_dist = budget.min(m).min(u8::MAX as usize) as u8;
    let mut matches = myers.find_all(text, max_dist);
    let mut aln = Alignment::default();

    while matches.next_alignment(&mut aln) {
        let off_text = |y: usize, pattern_only: bool| match overhang {
            _ if pad == 0 => false,
            Overhang::Start(_) => y < lo || (pattern_only && y == lo),
            _ => y >= hi,
        };

        let mut cigar = Cigar::default();
        let (mut y, mut dist, mut hanging) = (aln.ystart, 0, 0);
        for op in &aln.operations {
            match *op {
                AlignmentOperation::Match | AlignmentOperation::Subst if off_text(y, false) => {
                    cigar.push(EditOp::Overhang, 1);
                    hanging += 1;
                    y += 1;
                }
                AlignmentOperation::Match => {
                    cigar.push(EditOp::Match, 1);
                    y += 1;
                }
                AlignmentOperation::Subst => {
                    cigar.push(EditOp::Mismatch, 1);
                    dist += 1;
                    y += 1;
                }
                // pattern base with no text base
                AlignmentOperation::Ins if off_text(y, true) => {
                    cigar.push(EditOp::Overhang, 1);
                    hanging += 1;
                }
                AlignmentOperation::Ins => {
                    cigar.push(EditOp::Del, 1);
                    dist += 1;
                }
                // text base with no pattern base
                AlignmentOperation::Del => {
                    if !off_text(y, false) {
                        cigar.push(EditOp::Ins, 1);
                        dist += 1;
                    }
                    y += 1;
                }
                AlignmentOperation::Xclip(k) => {
                    cigar.push(EditOp::Overhang, k);
                    hanging += k;
                }
                AlignmentOperation::Yclip(k) => y += k,
            }
        }

        let aligned = m - hanging.min(m);
        let within = if hanging > 0 {
            aligned >= m - pad && dist <= budget * aligned / m
        } else {
            dist <= budget
        };
        if !within {
            continue;
        }

        found(Aln {
            start: aln.ystart.clamp(lo, hi) - lo,
            end: aln.yend.clamp(lo, hi) - lo,
            dist,
            overhang: hanging,
            cigar,
        });
    }
}

// dist, closeness to the anchored read end, 3' window, reverse, primer index
type Key = (usize, usize, bool, bool, usize);

/// Finds primers near the ends of reads.
#[derive(Debug, Clone, Copy)]
pub struct Locator {
    opts: LocateOpts,
}

impl Locator {
    pub fn new(opts: LocateOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &LocateOpts {
        &self.opts
    }

    pub fn budget(&self, primer_len: usize) -> usize {
        self.opts.max_edit_distance.get(primer_len)
    }

    fn min_aligned(&self, primer_len: usize) -> usize {
        ((self.opts.partial_min_frac * primer_len as f64).ceil() as usize).clamp(1, primer_len)
    }

    /// Shortest stretch of read that a primer of this length could match.
    fn min_matchable(&self, primer_len: usize) -> usize {
        let budget = self.budget(primer_len);
        if self.opts.partial_ends {
            let a = self.min_aligned(primer_len);
            a.saturating_sub(budget * a / primer_len).max(1)
        } else {
            primer_len.saturating_sub(budget).max(1)
        }
    }

    /// Best hit of any primer in the windows at the 5' and 3' ends of `read`.
    pub fn locate(&self, read: &[u8], primers: &PrimerSet) -> Option<Hit> {
        let len = read.len();
        let mut best: Option<(Key, Hit)> = None;

        let mut consider = |key: Key, hit: Hit| {
            if hit.is_empty() {
                return;
            }
            if best.as_ref().map_or(true, |(k, _)| key < *k) {
                best = Some((key, hit));
            }
        };

        for (idx, primer) in primers.iter().enumerate() {
            let m = primer.seq.len();
            if self.min_matchable(m) > len {
                // sorted by length, so no later primer fits either
                break;
            }
            let budget = self.budget(m);
            let window = self.opts.end_window.max(m + budget).min(len);
            let min_aligned = self.min_aligned(m);

            for reverse in [false, true] {
                if !primer.strand.allows(reverse) {
                    continue;
                }
                let pattern = primers.seq(idx, reverse);

                let (start_side, end_side) = match self.opts.partial_ends {
                    true => (Overhang::Start(min_aligned), Overhang::End(min_aligned)),
                    false => (Overhang::None, Overhang::None),
                };

                align(pattern, &read[..window], budget, start_side, |aln| {
                    let hit = to_hit(idx, reverse, aln, 0);
                    consider((hit.dist, hit.start, false, reverse, idx), hit);
                });

                if !primer.anchor_5p {
                    let offset = len - window;
                    align(pattern, &read[offset..], budget, end_side, |aln| {
                        let hit = to_hit(idx, reverse, aln, offset);
                        consider((hit.dist, len - hit.end, true, reverse, idx), hit);
                    });
                }
            }
        }

        best.map(|(_, hit)| hit)
    }

    /// Best hit of any primer inside `range` of `read`, ties going to the leftmost hit.
    pub fn locate_within(
        &self,
        read: &[u8],
        range: Range<usize>,
        primers: &PrimerSet,
        strand: Strand,
    ) -> Option<Hit> {
        let end = range.end.min(read.len());
        let start = range.start.min(end);
        let text = &read[start..end];
        let mut best: Option<(Key, Hit)> = None;

        for (idx, primer) in primers.iter().enumerate() {
            let m = primer.seq.len();
            if self.min_matchable(m) > text.len() {
                break;
            }
            let budget = self.budget(m);

            for reverse in [false, true] {
                if !strand.allows(reverse) || !primer.strand.allows(reverse) {
                    continue;
                }
                align(primers.seq(idx, reverse), text, budget, Overhang::None, |aln| {
                    let hit = to_hit(idx, reverse, aln, start);
                    let key = (hit.dist, hit.start, false, reverse, idx);
                    if !hit.is_empty() && best.as_ref().map_or(true, |(k, _)| key < *k) {
                        best = Some((key, hit));
                    }
                });
            }
        }

        best.map(|(_, hit)| hit)
    }
}

fn to_hit(primer: usize, reverse: bool, aln: Aln, offset: usize) -> Hit {
    Hit {
        primer,
        start: aln.start + offset,
        end: aln.end + offset,
        reverse,
        dist: aln.dist,
        overhang: aln.overhang,
        cigar: aln.cigar,
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;
    use crate::fastq::revcomp;

    fn set(seqs: &[&str]) -> PrimerSet {
        PrimerSet::new(
            "test",
            seqs.iter()
                .enumerate()
                .map(|(i, s)| Primer::new(format!("p{i}"), *s))
                .collect(),
        )
        .unwrap()
    }

    fn locator(budget: Threshold) -> Locator {
        Locator::new(LocateOpts {
            max_edit_distance: budget,
            ..Default::default()
        })
    }

    fn random_dna(rng: &mut Xoshiro256PlusPlus, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }

    const PRIMER: &str = "ACGTTGCAAGGCTTAC";

    #[test]
    fn thresholds() {
        assert_eq!(Threshold::from(0.25), Frac(0.25));
        assert_eq!(Threshold::from(3.0), Count(3));
        assert_eq!(Threshold::from(1.5), Count(2));
        assert_eq!(Threshold::from(2.4), Count(2));
        assert_eq!(Threshold::from(-1.0), Frac(0.0));
        assert_eq!(Threshold::from(f64::NAN), Frac(0.0));
        assert_eq!(Frac(0.2).get(16), 3);
        assert_eq!(Count(2).get(100), 2);
    }

    #[test]
    fn exact_at_known_offset() {
        let primers = set(&[PRIMER]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);

        for budget in [Count(0), Count(1), Count(3), Frac(0.2)] {
            for offset in [0, 5, 40] {
                let mut read = random_dna(&mut rng, offset);
                read.extend_from_slice(PRIMER.as_bytes());
                read.extend(random_dna(&mut rng, 30));
                if read.windows(PRIMER.len()).filter(|w| *w == PRIMER.as_bytes()).count() != 1 {
                    continue;
                }

                let hit = locator(budget).locate(&read, &primers).unwrap();
                assert_eq!(hit.dist, 0);
                assert_eq!(hit.start, offset);
                assert_eq!(hit.end, offset + PRIMER.len());
                assert!(!hit.reverse);
                assert_eq!(hit.cigar.to_string(), format!("{}=", PRIMER.len()));
            }
        }
    }

    #[test]
    fn substitutions_within_budget() {
        let primers = set(&[PRIMER]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);

        for d in 0..=3 {
            let mut primer = PRIMER.as_bytes().to_owned();
            for i in (0..d).map(|k| 2 + 5 * k) {
                primer[i] = if primer[i] == b'A' { b'C' } else { b'A' };
            }
            let mut read = random_dna(&mut rng, 10);
            read.extend_from_slice(&primer);
            read.extend(random_dna(&mut rng, 10));

            let hit = locator(Count(3)).locate(&read, &primers).unwrap();
            assert!(hit.dist <= d, "{} > {d}", hit.dist);
        }

        let mut read = b"TTTTT".to_vec();
        read.extend_from_slice(&PRIMER.as_bytes()[..8]);
        read.extend_from_slice(b"GGGGGGGG");
        assert!(locator(Count(1)).locate(&read, &primers).is_none());
    }

    #[test]
    fn reverse_orientation() {
        let primers = set(&[PRIMER]);
        let mut read = b"GGGGGGGGGG".to_vec();
        read.extend(revcomp(PRIMER.as_bytes()));
        read.extend_from_slice(b"CCCC");

        let hit = locator(Count(1)).locate(&read, &primers).unwrap();
        assert!(hit.reverse);
        assert_eq!(hit.dist, 0);
        assert_eq!(hit.range(), 10..26);

        let forward_only = PrimerSet::new(
            "test",
            vec![Primer {
                strand: Strand::Forward,
                ..Primer::new("p", PRIMER)
            }],
        )
        .unwrap();
        assert!(locator(Count(1)).locate(&read, &forward_only).map_or(true, |h| h.dist > 0));
    }

    #[test]
    fn deletion_in_read() {
        let primers = set(&[PRIMER]);
        let mut read = b"TTTTTTTT".to_vec();
        read.extend_from_slice(b"ACGTTGCAGGCTTAC");
        read.extend_from_slice(b"TTTTTTTT");

        let hit = locator(Count(2)).locate(&read, &primers).unwrap();
        assert_eq!(hit.dist, 1);
        assert_eq!(hit.start, 8);
        assert_eq!(hit.end, 8 + 15);
        assert!(hit.cigar.ops().iter().any(|(op, _)| *op == EditOp::Del));
    }

    #[test]
    fn partial_ends() {
        let primers = set(&[PRIMER]);
        let opts = LocateOpts {
            max_edit_distance: Count(2),
            partial_ends: true,
            partial_min_frac: 0.5,
            end_window: 200,
        };

        // the first 4 primer bases hang off the 5' end
        let mut read = PRIMER.as_bytes()[4..].to_owned();
        read.extend_from_slice(b"GGGGGGGGGGGGGGGGGGGG");
        let hit = Locator::new(opts).locate(&read, &primers).unwrap();
        assert_eq!(hit.start, 0);
        assert_eq!(hit.end, 12);
        assert_eq!(hit.overhang, 4);
        assert_eq!(hit.cigar.to_string(), "4H12=");

        // the last 5 primer bases hang off the 3' end
        let mut read = b"GGGGGGGGGGGGGGGGGGGG".to_vec();
        read.extend_from_slice(&PRIMER.as_bytes()[..11]);
        let hit = Locator::new(opts).locate(&read, &primers).unwrap();
        assert_eq!(hit.end, read.len());
        assert_eq!(hit.overhang, 5);
        assert_eq!(hit.cigar.to_string(), "11=5H");

        // too little of the primer is left
        let read = PRIMER.as_bytes()[12..].to_owned();
        assert!(Locator::new(opts).locate(&read, &primers).is_none());
        assert!(locator(Count(2)).locate(&PRIMER.as_bytes()[4..], &primers).is_none());
    }

    #[test]
    fn prefers_five_prime_end() {
        let primers = set(&["AATTAATTCC", "GGCCGGCCAA"]);
        let read = b"CCGGCCGGCCAATTTTTTTTTTTTTTAATTAATTCCTT";

        let hit = locator(Count(0)).locate(read, &primers).unwrap();
        assert_eq!(hit.start, 2);
        assert_eq!(primers[hit.primer].seq, "GGCCGGCCAA");

        let anchored = PrimerSet::new(
            "test",
            vec![Primer {
                anchor_5p: true,
                ..Primer::new("p", "AATTAATTCC")
            }],
        )
        .unwrap();
        let opts = LocateOpts {
            max_edit_distance: Count(0),
            end_window: 20,
            ..Default::default()
        };
        assert!(Locator::new(opts).locate(read, &anchored).is_none());
    }

    #[test]
    fn within_range_prefers_left() {
        let primers = set(&["TTAA"]);
        let read = b"GGTTAAGGGGTTAAGG";
        let l = locator(Count(0));

        let hit = l.locate_within(read, 0..read.len(), &primers, Strand::Forward).unwrap();
        assert_eq!(hit.start, 2);
        let hit = l.locate_within(read, 4..read.len(), &primers, Strand::Forward).unwrap();
        assert_eq!(hit.start, 10);
        assert!(l.locate_within(read, 12..40, &primers, Strand::Forward).is_none());
    }

    #[test]
    fn primer_wildcards() {
        let primers = set(&["ACGNNTGCA"]);
        let hit = locator(Count(0)).locate(b"TTTTACGTATGCATTTT", &primers).unwrap();
        assert_eq!(hit.range(), 4..13);
        assert_eq!(hit.cigar.to_string(), "9=");

        // an N in the read is not a wildcard
        let hit = locator(Count(1)).locate(b"TTTTNCGTATGCATTTT", &primers).unwrap();
        assert_eq!(hit.dist, 1);
    }

    #[test]
    fn partial_end_with_an_edit() {
        let primers = set(&[PRIMER]);
        let opts = LocateOpts {
            max_edit_distance: Count(2),
            partial_ends: true,
            partial_min_frac: 0.5,
            end_window: 200,
        };

        // 12 primer bases left at the 5' end, one of them substituted
        let mut read = PRIMER.as_bytes()[4..].to_owned();
        read[6] = if read[6] == b'A' { b'C' } else { b'A' };
        read.extend_from_slice(b"GGGGGGGGGGGGGGGGGGGG");
        let hit = Locator::new(opts).locate(&read, &primers).unwrap();
        assert_eq!(hit.start, 0);
        assert_eq!(hit.overhang, 4);
        assert_eq!(hit.dist, 1);
        assert_eq!(hit.cigar.to_string(), "4H6=1X5=");
    }

    #[test]
    fn short_reads() {
        let primers = set(&[PRIMER]);
        assert!(locator(Count(2)).locate(b"ACGT", &primers).is_none());
        assert!(locator(Count(2)).locate(b"", &primers).is_none());
    }
}
