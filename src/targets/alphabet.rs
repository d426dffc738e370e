//! Base58 alphabet checks and lookalike normalization.

/// The 58 symbols a worker can match against. `0`, `O`, `I` and `l` are
/// deliberately absent.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Lookup table indexed by ASCII code.
const MEMBERS: [bool; 128] = build_members();

const fn build_members() -> [bool; 128] {
    let mut table = [false; 128];
    let bytes = BASE58_ALPHABET.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        table[bytes[i] as usize] = true;
        i += 1;
    }
    table
}

#[inline]
pub fn is_member(c: char) -> bool {
    (c as u32) < 128 && MEMBERS[c as usize]
}

/// True iff every character of `s` is in the alphabet.
pub fn is_valid(s: &str) -> bool {
    s.chars().all(is_member)
}

/// Closest valid stand-in for each of the four ambiguous characters.
fn lookalike(c: char) -> Option<char> {
    match c {
        'l' => Some('L'),
        'I' => Some('i'),
        '0' | 'O' => Some('o'),
        _ => None,
    }
}

/// Maps a raw word onto the alphabet. Valid characters are kept, the ambiguous
/// four are swapped for their lookalike and everything else is dropped.
/// Never fails; the result may be empty.
pub fn normalize(word: &str) -> String {
    word.chars()
        .filter_map(|c| if is_member(c) { Some(c) } else { lookalike(c) })
        .collect()
}
