use lazy_static::lazy_static;

/// The 20 standard amino acids, in BLOSUM62 row order.
/// A symbol's position in this table is its encoded id (0..20).
pub const ALPHABET: [u8; 20] = *b"ARNDCQEGHILKMFPSTWYV";
pub const ALPHABET_SIZE: usize = 20;

lazy_static! {
    static ref ENCODE: [i8; 256] = {
        let mut table = [-1i8; 256];
        for (i, &c) in ALPHABET.iter().enumerate() {
            table[c as usize] = i as i8;
        }
        table
    };
}

/// Encode one residue character to its symbol id. Case-insensitive.
/// Returns `None` for anything outside the 20-letter alphabet
/// (including ambiguity codes such as B, J, O, U, X, Z).
#[inline]
pub fn encode(c: u8) -> Option<u8> {
    let v = ENCODE[c.to_ascii_uppercase() as usize];
    if v < 0 {
        None
    } else {
        Some(v as u8)
    }
}

#[inline]
pub fn contains(c: u8) -> bool {
    encode(c).is_some()
}

/// Encode a whole sequence, or `None` if any residue is outside the alphabet.
pub fn encode_seq(seq: &[u8]) -> Option<Vec<u8>> {
    seq.iter().map(|&c| encode(c)).collect()
}
