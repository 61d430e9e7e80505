use super::gf::Field;
use crate::errors::*;

/// Channel symbols in code order. Adding two bases is XOR of their codes (GF(4) addition).
pub const BASES: &[u8; 4] = b"ACGT";

/// Code used for any base that is not A, C, G or T.
pub const UNKNOWN_BASE: u8 = 4;

/// Largest number of codewords that is enumerated when decoding.
pub const MAX_CODEWORDS: usize = 1 << 16;

#[inline]
pub fn base_code(b: u8) -> u8 {
    match b {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => UNKNOWN_BASE,
    }
}

/// Split a field symbol into 2-bit bases, most significant first.
pub fn default_inner_word(symbol: usize, len: usize) -> Vec<u8> {
    (0..len)
        .rev()
        .map(|i| ((symbol >> (2 * i)) & 3) as u8)
        .collect()
}

fn codebook_err(msg: impl Into<String>) -> Error {
    Error::Channel(msg.into())
}

/// An (n, k) systematic linear code over GF(Q) whose symbols are written as short DNA words.
///
/// Position `j` of a codeword is transmitted as the inner word of the symbol added to slice `j`
/// of the watermark, followed by the marker unless it is the last position.
#[derive(Debug, Clone)]
pub struct Codebook {
    field: Field,
    n: usize,
    k: usize,
    parity: Vec<Vec<u8>>,
    words: Vec<Vec<u8>>,
    blocks: Vec<Vec<Vec<u8>>>,
    codewords: Vec<u8>,
}

impl Codebook {
    pub fn new(
        field: Field,
        n: usize,
        k: usize,
        words: Vec<Vec<u8>>,
        watermark: &[u8],
        marker: &[u8],
    ) -> Result<Self> {
        let q = field.order();

        if k == 0 || k > n {
            return Err(codebook_err(format!("need 0 < k <= n, got n={n} k={k}")));
        }
        if n > q {
            return Err(codebook_err(format!("codeword length n={n} exceeds the field order {q}")));
        }
        let num_codewords = q
            .checked_pow(k as u32)
            .filter(|&c| c <= MAX_CODEWORDS)
            .ok_or_else(|| codebook_err(format!("{q}^{k} codewords is more than {MAX_CODEWORDS}")))?;

        if words.len() != q {
            return Err(codebook_err(format!("inner codebook needs {q} words, got {}", words.len())));
        }
        let word_len = words[0].len();
        if word_len == 0 || words.iter().any(|w| w.len() != word_len) {
            return Err(codebook_err("inner codebook words must be non-empty and equally long"));
        }
        if words.iter().flatten().any(|&b| b >= UNKNOWN_BASE) {
            return Err(codebook_err("inner codebook words must only contain A, C, G and T"));
        }
        for (i, a) in words.iter().enumerate() {
            if words[..i].contains(a) {
                return Err(codebook_err("inner codebook words must be distinct"));
            }
        }
        if watermark.len() != n * word_len {
            return Err(codebook_err(format!(
                "watermark must have n * word length = {} bases, got {}",
                n * word_len,
                watermark.len()
            )));
        }
        if watermark.iter().chain(marker).any(|&b| b >= UNKNOWN_BASE) {
            return Err(codebook_err("watermark and marker must only contain A, C, G and T"));
        }

        // Cauchy matrix 1 / (x_i + y_j) with x_i = i and y_j = k + j, all distinct since n <= q
        let parity = (0..k)
            .map(|i| {
                (0..n - k)
                    .map(|j| field.inv(field.add(i as u8, (k + j) as u8)))
                    .collect()
            })
            .collect();

        let blocks = (0..n)
            .map(|j| {
                let wm = &watermark[j * word_len..(j + 1) * word_len];
                words
                    .iter()
                    .map(|w| {
                        let mut block = w.iter().zip(wm).map(|(&a, &b)| a ^ b).collect::<Vec<_>>();
                        if j + 1 < n {
                            block.extend_from_slice(marker);
                        }
                        block
                    })
                    .collect()
            })
            .collect();

        let mut res = Self {
            field,
            n,
            k,
            parity,
            words,
            blocks,
            codewords: Vec::with_capacity(num_codewords * n),
        };

        let mut msg = vec![0u8; k];
        for idx in 0..num_codewords {
            res.message_of(idx, &mut msg);
            let codeword = res.encode(&msg);
            res.codewords.extend_from_slice(&codeword);
        }

        Ok(res)
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn word_len(&self) -> usize {
        self.words[0].len()
    }

    pub fn num_codewords(&self) -> usize {
        self.codewords.len() / self.n
    }

    pub fn codeword(&self, idx: usize) -> &[u8] {
        &self.codewords[idx * self.n..(idx + 1) * self.n]
    }

    /// Message digits of codeword `idx`, most significant first.
    fn message_of(&self, mut idx: usize, msg: &mut [u8]) {
        let q = self.field.order();
        for m in msg.iter_mut().rev() {
            *m = (idx % q) as u8;
            idx /= q;
        }
    }

    pub fn message_index(&self, msg: &[u8]) -> usize {
        let q = self.field.order();
        msg.iter().fold(0, |acc, &m| acc * q + m as usize)
    }

    /// Systematic codeword: the message followed by its parity symbols.
    pub fn encode(&self, msg: &[u8]) -> Vec<u8> {
        let mut codeword = msg.to_owned();
        for j in 0..self.n - self.k {
            let p = msg
                .iter()
                .zip(&self.parity)
                .fold(0, |acc, (&m, row)| {
                    self.field.add(acc, self.field.mul(m, row[j]))
                });
            codeword.push(p);
        }
        codeword
    }

    /// Transmitted base codes for symbol `s` at codeword position `j`.
    #[inline]
    pub fn block(&self, j: usize, s: usize) -> &[u8] {
        &self.blocks[j][s]
    }

    /// Nominal length of the block at position `j`.
    #[inline]
    pub fn block_len(&self, j: usize) -> usize {
        self.blocks[j][0].len()
    }

    /// Number of bases of a transmitted codeword.
    pub fn tag_len(&self) -> usize {
        (0..self.n).map(|j| self.block_len(j)).sum()
    }

    /// Bases of a codeword as they would appear in a read.
    pub fn transmit(&self, codeword: &[u8]) -> Vec<u8> {
        codeword
            .iter()
            .enumerate()
            .flat_map(|(j, &s)| self.block(j, s as usize).iter().map(|&c| BASES[c as usize]))
            .collect()
    }

    /// External barcode string of a codeword: the inner words of its message symbols.
    pub fn tag(&self, codeword: &[u8]) -> Vec<u8> {
        codeword[..self.k]
            .iter()
            .flat_map(|&s| self.words[s as usize].iter().map(|&c| BASES[c as usize]))
            .collect()
    }
}
