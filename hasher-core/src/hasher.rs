use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Output alphabet of the name hasher.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alphabet {
    /// `a-z`, base 26.
    #[default]
    Lower,
    /// `a-z` then `A-Z`, base 52.
    Mixed,
}

impl Alphabet {
    pub fn base(self) -> u32 {
        match self {
            Alphabet::Lower => 26,
            Alphabet::Mixed => 52,
        }
    }

    fn symbol(self, digit: u32) -> char {
        // digit < base, so both conversions stay within ASCII letters
        if digit < 26 {
            char::from(b'a' + digit as u8)
        } else {
            char::from(b'A' + (digit - 26) as u8)
        }
    }
}

/// Projects raw names into short opaque identifiers.
///
/// The SHA-256 digest of the UTF-8 input is read as an unsigned big-endian
/// integer and repeatedly divided by the alphabet base; the remainders are
/// the digits, least significant first, and are written most significant
/// first. Only the low `digits` digits are used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NameHasher {
    alphabet: Alphabet,
    digits: usize,
}

impl Default for NameHasher {
    fn default() -> Self {
        Self::new(Alphabet::Lower, 8)
    }
}

impl NameHasher {
    pub fn new(alphabet: Alphabet, digits: usize) -> Self {
        Self { alphabet, digits }
    }

    pub fn hash(&self, raw: &str) -> String {
        let digest = Sha256::digest(raw.as_bytes());
        let mut value = [0u8; 32];
        value.copy_from_slice(&digest);

        let base = self.alphabet.base();
        let mut symbols = Vec::with_capacity(self.digits);
        for _ in 0..self.digits {
            let digit = div_rem(&mut value, base);
            symbols.push(self.alphabet.symbol(digit));
        }
        symbols.iter().rev().collect()
    }
}

/// Divides a big-endian unsigned integer in place, returning the remainder.
fn div_rem(value: &mut [u8; 32], divisor: u32) -> u32 {
    let mut remainder = 0u32;
    for byte in value.iter_mut() {
        let acc = (remainder << 8) | u32::from(*byte);
        *byte = (acc / divisor) as u8;
        remainder = acc % divisor;
    }
    remainder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_vectors() {
        let hasher = NameHasher::default();
        assert_eq!(hasher.hash("m;a/b/C.doThing;"), "gxgafkrx");
        assert_eq!(hasher.hash("Foo"), "epafcazq");
        assert_eq!(hasher.hash("f;Foo.bar;"), "sjnldvnz");
        assert_eq!(hasher.hash(""), "xwgorhuj");
    }

    #[test]
    fn mixed_alphabet() {
        let hasher = NameHasher::new(Alphabet::Mixed, 8);
        assert_eq!(hasher.hash("Foo"), "TWZkdAmQ");
        assert_eq!(hasher.hash("m;a/b/C.doThing;"), "VOZtAJiX");
    }

    #[test]
    fn stable_and_shaped() {
        let hasher = NameHasher::default();
        let first = hasher.hash("m;a/b/C.doThing;");
        for _ in 0..4 {
            assert_eq!(hasher.hash("m;a/b/C.doThing;"), first);
        }
        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_lowercase()));
        assert_ne!(hasher.hash("m;a/b/C.doThing;"), hasher.hash("f;a/b/C.doThing;"));
    }

    #[test]
    fn fewer_digits_are_a_suffix() {
        let long = NameHasher::new(Alphabet::Lower, 8).hash("Foo");
        let short = NameHasher::new(Alphabet::Lower, 5).hash("Foo");
        assert!(long.ends_with(&short));
    }

    #[test]
    fn division_matches_small_numbers() {
        let mut value = [0u8; 32];
        value[30] = 0x01;
        value[31] = 0x00; // 256
        assert_eq!(div_rem(&mut value, 26), 256 % 26);
        assert_eq!(value[31], (256 / 26) as u8);
        assert_eq!(value[30], 0);
    }
}
