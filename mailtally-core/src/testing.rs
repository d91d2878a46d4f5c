//! Archive fixtures built in memory for tests.
//!
//! Headers are written by hand in ustar layout so tests can produce entry
//! kinds (long names, PAX records, links) without a tar dependency.

use std::io::Write;

use flate2::{Compression, write::GzEncoder};

use crate::archive::BLOCK_LEN;

/// Sender counts of [`sample_mailbox_archive`], highest first.
pub const SAMPLE_SENDER_COUNTS: [(&str, u64); 10] = [
    ("sender1@example.com", 13),
    ("sender2@example.com", 12),
    ("sender3@example.com", 11),
    ("sender4@example.com", 8),
    ("sender5@example.com", 8),
    ("sender6@example.com", 8),
    ("sender7@example.com", 8),
    ("sender8@example.com", 8),
    ("sender9@example.com", 7),
    ("sender10@example.com", 7),
];

/// Total messages in [`sample_mailbox_archive`].
pub const SAMPLE_MESSAGES: u64 = 90;

#[derive(Debug, Default, Clone)]
pub struct TarBuilder {
    data: Vec<u8>,
}

impl TarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, contents: &[u8]) -> Self {
        self.push(name, b'0', "", contents);
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.push(name, b'5', "", &[]);
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        self.push(name, b'2', target, &[]);
        self
    }

    pub fn hard_link(mut self, name: &str, target: &str) -> Self {
        self.push(name, b'1', target, &[]);
        self
    }

    /// Regular file whose name is carried by a preceding GNU `L` record.
    pub fn gnu_long_name_file(mut self, name: &str, contents: &[u8]) -> Self {
        let mut record = name.as_bytes().to_vec();
        record.push(0);
        self.push("././@LongLink", b'L', "", &record);

        let short: String = name.chars().take(99).collect();
        self.push(&short, b'0', "", contents);
        self
    }

    /// Regular file whose name is carried by a preceding PAX `path=` record.
    pub fn pax_path_file(mut self, path: &str, contents: &[u8]) -> Self {
        let record = pax_record("path", path);
        self.push("PaxHeaders/entry", b'x', "", record.as_bytes());
        self.push("placeholder.eml", b'0', "", contents);
        self
    }

    /// Uncompressed tar with the two-block end-of-archive marker.
    pub fn into_tar(mut self) -> Vec<u8> {
        self.data.extend_from_slice(&[0; BLOCK_LEN * 2]);
        self.data
    }

    pub fn into_tar_gz(self) -> Vec<u8> {
        gzip(&self.into_tar())
    }

    fn push(&mut self, name: &str, typeflag: u8, link: &str, contents: &[u8]) {
        self.data
            .extend_from_slice(&ustar_header(name, typeflag, link, contents.len()));
        self.data.extend_from_slice(contents);
        let rem = contents.len() % BLOCK_LEN;
        if rem != 0 {
            self.data
                .extend(std::iter::repeat_n(0u8, BLOCK_LEN - rem));
        }
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("write to in-memory encoder");
    encoder.finish().expect("finish in-memory encoder")
}

/// Minimal RFC 5322 message with the given `From` value.
pub fn message(from: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: inbox@example.com\r\nSubject: Weekly update\r\n\
         \r\nHello there.\r\n"
    )
    .into_bytes()
}

/// 90 messages from ten senders, interleaved so no sender's messages are
/// contiguous. Counts follow [`SAMPLE_SENDER_COUNTS`].
pub fn sample_mailbox_archive() -> Vec<u8> {
    let mut remaining: Vec<(&str, u64)> = SAMPLE_SENDER_COUNTS.to_vec();
    let mut builder = TarBuilder::new().directory("mailbox/");
    let mut index = 0;
    while remaining.iter().any(|(_, left)| *left > 0) {
        for (sender, left) in remaining.iter_mut().filter(|(_, l)| *l > 0) {
            index += 1;
            let from = format!("Sender {index} <{sender}>");
            builder = builder.file(&format!("mailbox/{index:03}.eml"), &message(&from));
            *left -= 1;
        }
    }
    builder.into_tar_gz()
}

fn ustar_header(
    name: &str,
    typeflag: u8,
    link: &str,
    size: usize,
) -> [u8; BLOCK_LEN] {
    let mut hdr = [0u8; BLOCK_LEN];
    put(&mut hdr[0..100], name.as_bytes());
    put(&mut hdr[100..108], b"0000644\0");
    put(&mut hdr[108..116], b"0001750\0");
    put(&mut hdr[116..124], b"0001750\0");
    put(&mut hdr[124..136], format!("{size:011o}\0").as_bytes());
    put(&mut hdr[136..148], b"14715366000\0");
    hdr[156] = typeflag;
    put(&mut hdr[157..257], link.as_bytes());
    put(&mut hdr[257..263], b"ustar\0");
    put(&mut hdr[263..265], b"00");

    hdr[148..156].fill(b' ');
    let sum: u32 = hdr.iter().map(|&b| u32::from(b)).sum();
    put(&mut hdr[148..156], format!("{sum:06o}\0 ").as_bytes());
    hdr
}

fn put(field: &mut [u8], value: &[u8]) {
    let n = value.len().min(field.len());
    field[..n].copy_from_slice(&value[..n]);
}

fn pax_record(key: &str, value: &str) -> String {
    // "<len> key=value\n" where <len> counts its own digits.
    let body = key.len() + value.len() + 3;
    let mut len = body + 1;
    while len != body + len.to_string().len() {
        len = body + len.to_string().len();
    }
    format!("{len} {key}={value}\n")
}
