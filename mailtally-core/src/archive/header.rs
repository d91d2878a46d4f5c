//! ustar header field helpers.
//!
//! Size and checksum fields are untrusted; anything that does not parse is
//! reported as `None` and surfaced by the caller as a corrupt header.

pub const TAR_BLOCK_LEN: usize = 512;

const NAME: std::ops::Range<usize> = 0..100;
const SIZE: std::ops::Range<usize> = 124..136;
const CHECKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..262;
const PREFIX: std::ops::Range<usize> = 345..500;

pub type HeaderBlock = [u8; TAR_BLOCK_LEN];

/// Entry kinds the reader cares about. Everything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    GnuLongName,
    PaxLocal,
    PaxGlobal,
    Other(u8),
}

impl EntryKind {
    pub fn from_typeflag(flag: u8) -> Self {
        match flag {
            0 | b'0' | b'7' => Self::Regular,
            b'L' => Self::GnuLongName,
            b'x' => Self::PaxLocal,
            b'g' => Self::PaxGlobal,
            other => Self::Other(other),
        }
    }
}

pub fn typeflag(hdr: &HeaderBlock) -> u8 {
    hdr[TYPEFLAG]
}

pub fn is_zero_block(hdr: &HeaderBlock) -> bool {
    hdr.iter().all(|&b| b == 0)
}

/// Padding needed to bring `size` up to a block boundary.
pub fn block_padding(size: u64) -> u64 {
    let rem = size % TAR_BLOCK_LEN as u64;
    if rem == 0 {
        0
    } else {
        TAR_BLOCK_LEN as u64 - rem
    }
}

pub fn entry_size(hdr: &HeaderBlock) -> Option<u64> {
    parse_numeric(&hdr[SIZE])
}

/// Accepts both the unsigned and the historical signed checksum.
pub fn checksum_matches(hdr: &HeaderBlock) -> bool {
    let Some(expected) = parse_octal(&hdr[CHECKSUM]) else {
        return false;
    };

    let mut unsigned: u64 = 0;
    let mut signed: i64 = 0;
    for (i, &b) in hdr.iter().enumerate() {
        let b = if CHECKSUM.contains(&i) { b' ' } else { b };
        unsigned += u64::from(b);
        signed += i64::from(b as i8);
    }

    expected == unsigned || i64::try_from(expected).ok() == Some(signed)
}

/// Name from the header itself, joining the ustar prefix when present.
pub fn header_name(hdr: &HeaderBlock) -> Vec<u8> {
    let name = cstr(&hdr[NAME]);
    let prefix = cstr(&hdr[PREFIX]);
    let is_ustar = &hdr[MAGIC] == b"ustar";

    let mut out = Vec::with_capacity(prefix.len() + name.len() + 1);
    if is_ustar && !prefix.is_empty() {
        out.extend_from_slice(prefix);
        if !out.ends_with(b"/") {
            out.push(b'/');
        }
    }
    out.extend_from_slice(name);
    out
}

/// Extracts the `path=` value from a PAX extended header record set.
///
/// Records look like `"<len> <key>=<value>\n"`; malformed records end the
/// scan without failing the archive.
pub fn pax_path(records: &[u8]) -> Option<Vec<u8>> {
    let mut rest = records;
    let mut path = None;
    while !rest.is_empty() {
        let space = rest.iter().position(|&b| b == b' ')?;
        let len: usize = std::str::from_utf8(&rest[..space]).ok()?.parse().ok()?;
        if len <= space || len > rest.len() {
            return path;
        }
        let record = &rest[space + 1..len];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        if let Some(value) = record.strip_prefix(b"path=") {
            path = Some(value.to_vec());
        }
        rest = &rest[len..];
    }
    path
}

/// Strips the NULs and newline that end a GNU long-name record.
pub fn trim_record_terminators(bytes: &mut Vec<u8>) {
    while matches!(bytes.last(), Some(0 | b'\n')) {
        bytes.pop();
    }
}

fn cstr(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

/// Octal, or GNU base-256 when the high bit of the first byte is set.
fn parse_numeric(field: &[u8]) -> Option<u64> {
    if field.first().is_some_and(|b| b & 0x80 != 0) {
        let mut value: u64 = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(b))?;
        }
        return Some(value);
    }
    parse_octal(field)
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut i = 0;
    while i < field.len() && (field[i] == 0 || field[i] == b' ') {
        i += 1;
    }
    let mut end = i;
    while end < field.len() && (b'0'..=b'7').contains(&field[end]) {
        end += 1;
    }
    // Anything after the digits must be padding.
    if field[end..].iter().any(|&b| b != 0 && b != b' ') {
        return None;
    }
    if end == i {
        return Some(0);
    }
    let mut value: u64 = 0;
    for &d in &field[i..end] {
        value = value.checked_mul(8)?.checked_add(u64::from(d - b'0'))?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_fields_tolerate_padding() {
        assert_eq!(parse_octal(b"00000000644\0"), Some(0o644));
        assert_eq!(parse_octal(b"   755 \0"), Some(0o755));
        assert_eq!(parse_octal(b"\0\0\0\0"), Some(0));
        assert_eq!(parse_octal(b"12x4\0"), None);
    }

    #[test]
    fn base256_sizes_are_decoded() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[11] = 0x02;
        field[10] = 0x01;
        assert_eq!(parse_numeric(&field), Some(0x0102));
    }

    #[test]
    fn base256_accepts_full_u64_range() {
        let mut field = [0xffu8; 12];
        field[..4].copy_from_slice(&[0x80, 0, 0, 0]);
        assert_eq!(parse_numeric(&field), Some(u64::MAX));

        field[3] = 1;
        assert_eq!(parse_numeric(&field), None);
    }

    #[test]
    fn long_name_terminators_are_trimmed() {
        let mut name = b"dir/long.eml\n\0\0".to_vec();
        trim_record_terminators(&mut name);
        assert_eq!(name, b"dir/long.eml");
    }

    #[test]
    fn padding_rounds_to_block() {
        assert_eq!(block_padding(0), 0);
        assert_eq!(block_padding(1), 511);
        assert_eq!(block_padding(512), 0);
        assert_eq!(block_padding(513), 511);
    }

    #[test]
    fn pax_records_yield_last_path() {
        let records = b"20 path=a/first.eml\n21 path=b/second.eml\n";
        assert_eq!(pax_path(records), Some(b"b/second.eml".to_vec()));
        assert_eq!(pax_path(b"17 mtime=12345.5\n"), None);
    }

    #[test]
    fn typeflags_map_to_kinds() {
        assert_eq!(EntryKind::from_typeflag(b'0'), EntryKind::Regular);
        assert_eq!(EntryKind::from_typeflag(0), EntryKind::Regular);
        assert_eq!(EntryKind::from_typeflag(b'5'), EntryKind::Other(b'5'));
        assert_eq!(EntryKind::from_typeflag(b'2'), EntryKind::Other(b'2'));
    }
}
