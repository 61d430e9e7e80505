use super::channel::ChannelModel;
use super::codebook::*;
use super::fixed::*;

/// Outcome of decoding the tag inside one read span.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Inner words of the decoded message symbols.
    pub tag: Vec<u8>,
    /// Posterior weight of the decoded codeword against the whole codebook, in `[0, 1]`.
    pub confidence: f64,
    /// Per-base geometric mean likelihood of the best path through adapters and tag.
    pub norm: f64,
    /// Start of the tag in the span.
    pub offset: usize,
    /// Best end position of the 5' adapter in the span.
    pub best5p: Option<usize>,
    pub best5p_norm: f64,
    /// Best start position of the 3' adapter in the span.
    pub best3p: Option<usize>,
    pub best3p_norm: f64,
}

impl DecodeResult {
    pub fn is_confident(&self, min_confidence: f64) -> bool {
        !self.tag.is_empty() && self.confidence > 0.0 && self.confidence >= min_confidence
    }
}

struct OffsetDecode {
    offset: usize,
    total: u64,
    best: usize,
    confidence: f64,
}

/// Maximum-likelihood tag decoder.
///
/// Owns a copy of the channel model and the scratch buffers of the dynamic programs, so every
/// worker thread needs its own decoder.
pub struct WatermarkDecoder {
    model: ChannelModel,
    scratch: Scratch,
}

impl WatermarkDecoder {
    pub fn new(model: ChannelModel) -> Self {
        Self {
            model,
            scratch: Scratch::default(),
        }
    }

    pub fn model(&self) -> &ChannelModel {
        &self.model
    }

    /// Decode the tag in `span`, which should contain the 5' adapter, the tag and the 3' adapter.
    ///
    /// Either adapter may be empty when it is unknown. Quality characters beyond the end of
    /// `qual` fall into the lowest quality bin.
    pub fn decode(
        &mut self,
        span: &[u8],
        qual: &[u8],
        adapter5: &[u8],
        adapter3: &[u8],
    ) -> DecodeResult {
        let model = &self.model;
        let s = &mut self.scratch;
        let len = span.len();
        let tag_len = model.tag_len();

        s.load(model, span, qual);

        let a5 = adapter5.iter().map(|&b| base_code(b)).collect::<Vec<_>>();
        let a3 = adapter3.iter().rev().map(|&b| base_code(b)).collect::<Vec<_>>();

        // 5' adapter with a free start, indexed by end position
        s.cost5.clear();
        s.cost5.resize(len + 1, 0);
        if !a5.is_empty() {
            align_row(model, &a5, &s.ys, &s.bins, true, &mut s.cost5);
        }
        // 3' adapter with a free end, indexed by start position
        s.cost3.clear();
        s.cost3.resize(len + 1, 0);
        if !a3.is_empty() {
            let rev_ys = s.ys.iter().rev().copied().collect::<Vec<_>>();
            let rev_bins = s.bins.iter().rev().copied().collect::<Vec<_>>();
            align_row(model, &a3, &rev_ys, &rev_bins, true, &mut s.cost3);
            s.cost3.reverse();
        }

        let (best5p, best5p_norm) = best_adapter(&s.cost5, a5.len());
        let (best3p, best3p_norm) = best_adapter(&s.cost3, a3.len());

        let mut res = DecodeResult {
            tag: Vec::new(),
            confidence: 0.0,
            norm: 0.0,
            offset: 0,
            best5p,
            best5p_norm,
            best3p,
            best3p_norm,
        };

        let u = model.u() as isize;
        if (len as isize) + u < tag_len as isize {
            return res;
        }

        let nominal = match (best5p, best3p) {
            (Some(e), Some(_)) if best5p_norm >= best3p_norm => e as isize,
            (Some(e), None) => e as isize,
            (_, Some(st)) => st as isize - tag_len as isize,
            (None, None) => 0,
        };
        res.offset = nominal.clamp(0, len as isize) as usize;

        // the adapter may also be explained as random bases
        let rand5 = sat_mul(float2fix(2.0), a5.len());
        let rand3 = sat_mul(float2fix(2.0), a3.len());
        let eps = model.tie_epsilon() as u64;

        let mut best: Option<OffsetDecode> = None;
        for o in (nominal - u)..=(nominal + u) {
            if o < 0 || o as usize > len {
                continue;
            }
            if let Some(d) = s.decode_at(model, o as usize, rand5, rand3) {
                if best.as_ref().map_or(true, |b| d.total + eps < b.total) {
                    best = Some(d);
                }
            }
        }

        if let Some(best) = best {
            let cb = model.codebook();
            res.tag = cb.tag(cb.codeword(best.best));
            res.confidence = best.confidence;
            res.offset = best.offset;
            let bases = (tag_len + a5.len() + a3.len()).max(1) as f64;
            res.norm = (-(best.total as f64 * PREC) / bases).exp2();
        }

        res
    }
}

/// Earliest position with the lowest cost and its per-base likelihood.
fn best_adapter(costs: &[Cost], len: usize) -> (Option<usize>, f64) {
    if len == 0 {
        return (None, 0.0);
    }
    let Some((pos, &cost)) = costs
        .iter()
        .enumerate()
        .min_by_key(|&(i, &c)| (c, i))
    else {
        return (None, 0.0);
    };
    if cost >= COST_MAX {
        return (None, 0.0);
    }
    (Some(pos), (-fix2float(cost) / len as f64).exp2())
}

/// Edit cost of `pattern` against every prefix of `ys` under the channel model.
///
/// `row[r]` ends up as the cost of the whole pattern against `ys[..r]`. With `free_start` the
/// pattern may begin anywhere in `ys`, so `row[r]` is the cost of the best match ending at `r`.
fn align_row(
    model: &ChannelModel,
    pattern: &[u8],
    ys: &[u8],
    bins: &[usize],
    free_start: bool,
    row: &mut [Cost],
) {
    for (r, c) in row.iter_mut().enumerate() {
        *c = if free_start { 0 } else { sat_mul(model.ins(), r) };
    }

    for (i, &x) in pattern.iter().enumerate() {
        let mut diag = row[0];
        row[0] = sat_mul(model.del(), i + 1);
        for r in 1..row.len() {
            let sub = sat_add(
                sat_add(diag, model.keep()),
                model.emit(bins[r - 1], x, ys[r - 1]),
            );
            let del = sat_add(row[r], model.del());
            let ins = sat_add(row[r - 1], model.ins());
            diag = row[r];
            row[r] = sub.min(del).min(ins);
        }
    }
}

/// Subtract the smallest finite cost and return it.
fn normalize(costs: &mut [Cost]) -> u64 {
    let min = costs.iter().copied().min().unwrap_or(COST_MAX);
    if min == 0 || min >= COST_MAX {
        return 0;
    }
    for c in costs.iter_mut().filter(|c| **c < COST_MAX) {
        *c -= min;
    }
    min as u64
}

#[derive(Default)]
struct Scratch {
    ys: Vec<u8>,
    bins: Vec<usize>,
    cost5: Vec<Cost>,
    cost3: Vec<Cost>,
    // nominal start of every block for the current offset, plus the end of the tag
    starts: Vec<isize>,
    // branch[((j * drifts + d) * q + s) * width + r]
    branch: Vec<Cost>,
    width: usize,
    ends: Vec<Cost>,
    alpha: Vec<Cost>,
    beta: Vec<Cost>,
    lambda: Vec<Cost>,
    prior: Vec<Cost>,
    extrinsic: Vec<u64>,
    scores: Vec<u64>,
}

impl Scratch {
    fn load(&mut self, model: &ChannelModel, span: &[u8], qual: &[u8]) {
        self.ys.clear();
        self.ys.extend(span.iter().map(|&b| base_code(b)));
        self.bins.clear();
        self.bins
            .extend((0..span.len()).map(|i| qual.get(i).map_or(0, |&c| model.qual_bin(c))));
    }

    #[inline]
    fn branch_idx(&self, q: usize, drifts: usize, j: usize, d: usize, s: usize, r: usize) -> usize {
        ((j * drifts + d) * q + s) * self.width + r
    }

    fn decode_at(
        &mut self,
        model: &ChannelModel,
        offset: usize,
        rand5: Cost,
        rand3: Cost,
    ) -> Option<OffsetDecode> {
        let cb = model.codebook();
        let nq = cb.n() * cb.field().order();

        self.fill_branches(model, offset);
        self.fill_ends(model, rand3);
        let start = self.cost5[offset].min(rand5);

        self.prior.clear();
        self.prior.resize(nq, 0);

        let mut res = OffsetDecode {
            offset,
            total: 0,
            best: 0,
            confidence: 0.0,
        };

        for pass in 0..model.iter() {
            let base = self.forward(model, start);
            let drifts = self.ends.len();
            let tail = &self.alpha[cb.n() * drifts..];
            let end = tail
                .iter()
                .zip(&self.ends)
                .map(|(&a, &e)| sat_add(a, e))
                .min()
                .unwrap_or(COST_MAX);
            if end >= COST_MAX {
                if pass == 0 {
                    return None;
                }
                break;
            }
            if pass == 0 {
                res.total = base + end as u64;
            }

            self.backward(model);
            self.metrics(model);
            let (best, confidence) = self.score(model);

            let stable = pass > 0 && best == res.best;
            res.best = best;
            res.confidence = confidence;
            if stable {
                break;
            }
            if pass + 1 < model.iter() {
                self.feed_back(model);
            }
        }

        Some(res)
    }

    fn fill_branches(&mut self, model: &ChannelModel, offset: usize) {
        let cb = model.codebook();
        let (n, q) = (cb.n(), cb.field().order());
        let u = model.u() as isize;
        let drifts = 2 * model.u() + 1;
        let len = self.ys.len();

        self.starts.clear();
        let mut p = offset as isize;
        for j in 0..n {
            self.starts.push(p);
            p += cb.block_len(j) as isize;
        }
        self.starts.push(p);

        let max_block = (0..n).map(|j| cb.block_len(j)).max().unwrap_or(0);
        self.width = max_block + model.imax() + 1;
        self.branch.clear();
        self.branch.resize(n * drifts * q * self.width, COST_MAX);

        for j in 0..n {
            let max_recv = cb.block_len(j) + model.imax();
            for d in 0..drifts {
                let p = self.starts[j] + d as isize - u;
                if p < 0 || p as usize > len {
                    continue;
                }
                let p = p as usize;
                let recv = max_recv.min(len - p);
                for s in 0..q {
                    let i = self.branch_idx(q, drifts, j, d, s, 0);
                    align_row(
                        model,
                        cb.block(j, s),
                        &self.ys[p..p + recv],
                        &self.bins[p..p + recv],
                        false,
                        &mut self.branch[i..i + recv + 1],
                    );
                }
            }
        }
    }

    fn fill_ends(&mut self, model: &ChannelModel, rand3: Cost) {
        let u = model.u() as isize;
        let drifts = 2 * model.u() + 1;
        let len = self.ys.len() as isize;
        let tag_end = self.starts[self.starts.len() - 1];

        self.ends.clear();
        for d in 0..drifts {
            let e = tag_end + d as isize - u;
            self.ends.push(if (0..=len).contains(&e) {
                self.cost3[e as usize].min(rand3)
            } else {
                COST_MAX
            });
        }
    }

    /// Received bases for block `j` when moving from drift `from` to drift `to`.
    #[inline]
    fn received(&self, model: &ChannelModel, j: usize, from: usize, to: usize) -> Option<usize> {
        let r = model.codebook().block_len(j) as isize + to as isize - from as isize;
        (0..=(model.codebook().block_len(j) + model.imax()) as isize)
            .contains(&r)
            .then_some(r as usize)
    }

    fn forward(&mut self, model: &ChannelModel, start: Cost) -> u64 {
        let cb = model.codebook();
        let (n, q) = (cb.n(), cb.field().order());
        let drifts = 2 * model.u() + 1;

        self.alpha.clear();
        self.alpha.resize((n + 1) * drifts, COST_MAX);
        self.alpha[model.u()] = start;

        let mut base = 0;
        for j in 0..n {
            for to in 0..drifts {
                let mut best = COST_MAX;
                for from in 0..drifts {
                    let a = self.alpha[j * drifts + from];
                    if a >= COST_MAX {
                        continue;
                    }
                    let Some(r) = self.received(model, j, from, to) else {
                        continue;
                    };
                    for s in 0..q {
                        let b = self.branch[self.branch_idx(q, drifts, j, from, s, r)];
                        best = best.min(sat_add(sat_add(a, self.prior[j * q + s]), b));
                    }
                }
                self.alpha[(j + 1) * drifts + to] = best;
            }
            base += normalize(&mut self.alpha[(j + 1) * drifts..(j + 2) * drifts]);
        }

        base
    }

    fn backward(&mut self, model: &ChannelModel) {
        let cb = model.codebook();
        let (n, q) = (cb.n(), cb.field().order());
        let drifts = 2 * model.u() + 1;

        self.beta.clear();
        self.beta.resize((n + 1) * drifts, COST_MAX);
        self.beta[n * drifts..].copy_from_slice(&self.ends);
        normalize(&mut self.beta[n * drifts..]);

        for j in (0..n).rev() {
            for from in 0..drifts {
                let mut best = COST_MAX;
                for to in 0..drifts {
                    let b = self.beta[(j + 1) * drifts + to];
                    if b >= COST_MAX {
                        continue;
                    }
                    let Some(r) = self.received(model, j, from, to) else {
                        continue;
                    };
                    for s in 0..q {
                        let c = self.branch[self.branch_idx(q, drifts, j, from, s, r)];
                        best = best.min(sat_add(sat_add(c, self.prior[j * q + s]), b));
                    }
                }
                self.beta[j * drifts + from] = best;
            }
            normalize(&mut self.beta[j * drifts..(j + 1) * drifts]);
        }
    }

    /// Per-symbol costs that leave out the symbol's own prior.
    fn metrics(&mut self, model: &ChannelModel) {
        let cb = model.codebook();
        let (n, q) = (cb.n(), cb.field().order());
        let drifts = 2 * model.u() + 1;

        self.lambda.clear();
        self.lambda.resize(n * q, COST_MAX);

        for j in 0..n {
            for s in 0..q {
                let mut best = COST_MAX;
                for from in 0..drifts {
                    let a = self.alpha[j * drifts + from];
                    if a >= COST_MAX {
                        continue;
                    }
                    for to in 0..drifts {
                        let b = self.beta[(j + 1) * drifts + to];
                        let Some(r) = self.received(model, j, from, to) else {
                            continue;
                        };
                        let c = self.branch[self.branch_idx(q, drifts, j, from, s, r)];
                        best = best.min(sat_add(sat_add(a, c), b));
                    }
                }
                self.lambda[j * q + s] = best;
            }
            normalize(&mut self.lambda[j * q..(j + 1) * q]);
        }
    }

    /// Score every codeword and return the best one with its confidence.
    fn score(&mut self, model: &ChannelModel) -> (usize, f64) {
        let cb = model.codebook();
        let q = cb.field().order();

        self.scores.clear();
        self.scores.extend((0..cb.num_codewords()).map(|c| {
            cb.codeword(c)
                .iter()
                .enumerate()
                .map(|(j, &s)| self.lambda[j * q + s as usize] as u64)
                .sum::<u64>()
        }));

        let (best, &best_score) = self
            .scores
            .iter()
            .enumerate()
            .min_by_key(|&(i, &c)| (c, i))
            .unwrap_or((0, &u64::MAX));
        if best_score >= COST_MAX as u64 {
            return (best, 0.0);
        }

        let total = self
            .scores
            .iter()
            .map(|&c| (-((c - best_score) as f64 * PREC)).exp2())
            .sum::<f64>();
        (best, 1.0 / total)
    }

    /// Turn the codebook scores into extrinsic symbol priors for the next pass.
    fn feed_back(&mut self, model: &ChannelModel) {
        let cb = model.codebook();
        let (n, q) = (cb.n(), cb.field().order());

        self.extrinsic.clear();
        self.extrinsic.resize(n * q, u64::MAX);
        for (c, &score) in self.scores.iter().enumerate() {
            for (j, &s) in cb.codeword(c).iter().enumerate() {
                let i = j * q + s as usize;
                let rest = score - self.lambda[i] as u64;
                self.extrinsic[i] = self.extrinsic[i].min(rest);
            }
        }

        for j in 0..n {
            let row = &self.extrinsic[j * q..(j + 1) * q];
            let min = row.iter().copied().min().unwrap_or(0);
            for (s, &e) in row.iter().enumerate() {
                self.prior[j * q + s] = if e == u64::MAX {
                    COST_MAX
                } else {
                    (e - min).min(COST_MAX as u64) as Cost
                };
            }
        }
    }
}
