//! Decoding of watermarked DNA tags.
//!
//! A tag is a codeword of a short linear code over GF(Q). Each field symbol is written as a DNA
//! word, masked with a fixed watermark sequence and separated from the next symbol by a marker.
//! The decoder recovers the most likely codeword from a noisy read under a channel with
//! substitutions, insertions and deletions.

pub mod gf;

pub mod fixed;

pub mod codebook;
pub use codebook::Codebook;

pub mod channel;
pub use channel::*;

pub mod decoder;
pub use decoder::*;
