//! Arithmetic over GF(Q) for Q in {4, 8, 16}.
//!
//! Addition is XOR. Multiplication and inversion go through constant discrete-log (`LOGQ*`) and
//! antilog (`EXPQ*`) tables, so a [`Field`] is just a pair of `'static` slices and can be shared by
//! every worker without synchronization.

const LOGQ4: [u8; 4] = [0, 0, 1, 2];
const EXPQ4: [u8; 3] = [1, 2, 3];

const LOGQ8: [u8; 8] = [0, 0, 1, 3, 2, 6, 4, 5];
const EXPQ8: [u8; 7] = [1, 2, 4, 3, 6, 7, 5];

const LOGQ16: [u8; 16] = [0, 0, 1, 4, 2, 8, 5, 10, 3, 14, 9, 7, 6, 13, 11, 12];
const EXPQ16: [u8; 15] = [1, 2, 4, 8, 3, 6, 12, 11, 5, 10, 7, 14, 15, 13, 9];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    q: usize,
    log: &'static [u8],
    exp: &'static [u8],
}

impl Field {
    /// Field of order `q`, or `None` if `q` is not 4, 8 or 16.
    pub fn new(q: usize) -> Option<Self> {
        let (log, exp): (&'static [u8], &'static [u8]) = match q {
            4 => (&LOGQ4, &EXPQ4),
            8 => (&LOGQ8, &EXPQ8),
            16 => (&LOGQ16, &EXPQ16),
            _ => return None,
        };
        Some(Self { q, log, exp })
    }

    pub fn order(&self) -> usize {
        self.q
    }

    /// Bits per field symbol.
    pub fn log2q(&self) -> u32 {
        self.q.trailing_zeros()
    }

    #[inline]
    pub fn add(&self, a: u8, b: u8) -> u8 {
        a ^ b
    }

    #[inline]
    pub fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        let n = self.q - 1;
        let l = self.log[a as usize] as usize + self.log[b as usize] as usize;
        self.exp[l % n]
    }

    /// Multiplicative inverse. Zero has none and maps to zero.
    #[inline]
    pub fn inv(&self, a: u8) -> u8 {
        if a == 0 {
            return 0;
        }
        let n = self.q - 1;
        self.exp[(n - self.log[a as usize] as usize) % n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_orders() {
        assert!(Field::new(2).is_none());
        assert!(Field::new(32).is_none());
        assert_eq!(Field::new(8).unwrap().log2q(), 3);
    }

    #[test]
    fn tables_are_consistent() {
        for q in [4, 8, 16] {
            let f = Field::new(q).unwrap();
            for (l, &e) in f.exp.iter().enumerate() {
                assert_eq!(f.log[e as usize] as usize, l, "GF({q}) log/exp mismatch at {e}");
            }
        }
    }

    #[test]
    fn field_axioms() {
        for q in [4, 8, 16] {
            let f = Field::new(q).unwrap();
            for a in 0..q as u8 {
                assert_eq!(f.mul(a, 1), a);
                assert_eq!(f.mul(a, 0), 0);
                if a != 0 {
                    assert_eq!(f.mul(a, f.inv(a)), 1, "GF({q}) inverse of {a}");
                }
                for b in 0..q as u8 {
                    assert_eq!(f.mul(a, b), f.mul(b, a));
                    for c in 0..q as u8 {
                        // distributivity over XOR
                        assert_eq!(
                            f.mul(a, f.add(b, c)),
                            f.add(f.mul(a, b), f.mul(a, c)),
                            "GF({q}) distributivity {a} {b} {c}"
                        );
                    }
                }
            }
        }
    }
}
