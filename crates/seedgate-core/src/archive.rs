//! The packed seed table backing a category.
//!
//! On disk a category is a single file, optionally gzip-compressed (by
//! `.gz` extension):
//!
//! ```text
//! len_url:  u8, nonzero
//! url:      len_url bytes, UTF-8
//! len_name: u16 big-endian, nonzero
//! name:     len_name bytes, UTF-8
//! seeds:    a whole number of 8-byte big-endian records
//! ```
//!
//! In memory the seeds stay in that packed form — one contiguous,
//! 8-aligned buffer, sorted ascending by unsigned value — and the
//! membership test works directly on it.

use std::{
    cmp::Ordering,
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
};

use flate2::bufread::GzDecoder;
use thiserror::Error;

/// Width of one seed record.
pub const SEED_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("seed file I/O: {0}")]
    Io(#[from] io::Error),
    #[error("url length byte is zero")]
    EmptyUrl,
    #[error("name length field is zero")]
    EmptyName,
    #[error("url longer than 255 bytes: {0}")]
    UrlTooLong(usize),
    #[error("name longer than 65535 bytes: {0}")]
    NameTooLong(usize),
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("seed table has {trailing} trailing bytes after the last full record")]
    RaggedTable { trailing: usize },
}

/// A category's seed population, plus its url slug and display name.
#[derive(Debug, Clone)]
pub struct SeedArchive {
    url: String,
    name: String,
    seeds: Vec<u8>,
}

impl SeedArchive {
    /// Assemble an archive from unpacked parts; seeds are sorted and
    /// packed big-endian. Used by the pack tooling and tests.
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        mut seeds: Vec<u64>,
    ) -> Result<Self, ArchiveError> {
        let url = url.into();
        let name = name.into();
        if url.is_empty() {
            return Err(ArchiveError::EmptyUrl);
        }
        if url.len() > u8::MAX as usize {
            return Err(ArchiveError::UrlTooLong(url.len()));
        }
        if name.is_empty() {
            return Err(ArchiveError::EmptyName);
        }
        if name.len() > u16::MAX as usize {
            return Err(ArchiveError::NameTooLong(name.len()));
        }

        seeds.sort_unstable();
        let mut packed = Vec::with_capacity(seeds.len() * SEED_LEN);
        for seed in seeds {
            packed.extend_from_slice(&seed.to_be_bytes());
        }
        Ok(Self { url, name, seeds: packed })
    }

    /// Parse the packed format from a reader (already decompressed).
    pub fn parse(reader: &mut impl Read) -> Result<Self, ArchiveError> {
        let mut len_url = [0u8; 1];
        reader.read_exact(&mut len_url)?;
        if len_url[0] == 0 {
            return Err(ArchiveError::EmptyUrl);
        }
        let mut url = vec![0u8; usize::from(len_url[0])];
        reader.read_exact(&mut url)?;
        let url =
            String::from_utf8(url).map_err(|_| ArchiveError::InvalidUtf8 { field: "url" })?;

        let mut len_name = [0u8; 2];
        reader.read_exact(&mut len_name)?;
        let len_name = u16::from_be_bytes(len_name);
        if len_name == 0 {
            return Err(ArchiveError::EmptyName);
        }
        let mut name = vec![0u8; usize::from(len_name)];
        reader.read_exact(&mut name)?;
        let name =
            String::from_utf8(name).map_err(|_| ArchiveError::InvalidUtf8 { field: "name" })?;

        let mut seeds = Vec::new();
        reader.read_to_end(&mut seeds)?;
        if seeds.len() % SEED_LEN != 0 {
            return Err(ArchiveError::RaggedTable { trailing: seeds.len() % SEED_LEN });
        }

        Ok(Self { url, name, seeds })
    }

    /// Load an archive from disk, gunzipping when the path ends in `.gz`,
    /// and sort it unless told otherwise. The serving path always uses
    /// the sorted form.
    pub fn load(path: &Path, sort: bool) -> Result<Self, ArchiveError> {
        let mut file = BufReader::new(File::open(path)?);
        let mut archive = if path.extension().is_some_and(|ext| ext == "gz") {
            Self::parse(&mut GzDecoder::new(file))?
        } else {
            Self::parse(&mut file)?
        };
        if sort {
            archive.sort();
        }
        Ok(archive)
    }

    /// Write the packed format (uncompressed) to a writer.
    pub fn pack(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&[self.url.len() as u8])?;
        writer.write_all(self.url.as_bytes())?;
        writer.write_all(&(self.name.len() as u16).to_be_bytes())?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(&self.seeds)
    }

    fn sort(&mut self) {
        let mut records: Vec<[u8; SEED_LEN]> = self
            .seeds
            .chunks_exact(SEED_LEN)
            .map(|chunk| chunk.try_into().expect("chunks_exact yields full records"))
            .collect();
        records.sort_unstable();
        self.seeds = records.concat();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed_count(&self) -> usize {
        self.seeds.len() / SEED_LEN
    }

    /// Bits needed to cover every index: `⌈log₂ seed_count⌉`.
    pub fn seed_bits(&self) -> u32 {
        match self.seed_count() {
            0 | 1 => 0,
            n => usize::BITS - (n - 1).leading_zeros(),
        }
    }

    /// The record at `idx` (indices run `0..seed_count`).
    pub fn seed_at(&self, idx: usize) -> [u8; SEED_LEN] {
        self.seeds[idx * SEED_LEN..(idx + 1) * SEED_LEN]
            .try_into()
            .expect("slice is exactly one record")
    }

    fn at(&self, idx: usize) -> u64 {
        u64::from_be_bytes(self.seed_at(idx))
    }

    /// Membership test over the sorted table.
    ///
    /// Three phases: an interpolation estimate lands on (or near) the
    /// record in O(1) when seeds are close to uniformly distributed;
    /// galloping with a doubling step brackets the target from the
    /// estimate; binary search shrinks the bracket until a short linear
    /// scan finishes. The binary phase bounds the worst case to O(log N)
    /// for adversarially clumped tables.
    pub fn contains(&self, seed: u64) -> bool {
        let n = self.seed_count();
        if n == 0 {
            return false;
        }
        if seed < self.at(0) || seed > self.at(n - 1) {
            return false;
        }

        let est = (((u128::from(seed) * n as u128) >> 64) as usize).min(n - 1);
        let mut left;
        let mut right;
        match self.at(est).cmp(&seed) {
            Ordering::Equal => return true,
            Ordering::Less => {
                left = est;
                right = n - 1;
                let mut step = 1;
                loop {
                    let probe = left + step;
                    if probe >= n {
                        break;
                    }
                    match self.at(probe).cmp(&seed) {
                        Ordering::Equal => return true,
                        Ordering::Less => {
                            left = probe;
                            step *= 2;
                        }
                        Ordering::Greater => {
                            right = probe;
                            break;
                        }
                    }
                }
            }
            Ordering::Greater => {
                left = 0;
                right = est;
                let mut step = 1;
                loop {
                    if step >= right {
                        break;
                    }
                    let probe = right - step;
                    match self.at(probe).cmp(&seed) {
                        Ordering::Equal => return true,
                        Ordering::Greater => {
                            right = probe;
                            step *= 2;
                        }
                        Ordering::Less => {
                            left = probe;
                            break;
                        }
                    }
                }
            }
        }

        while right - left > 8 {
            let mid = left + (right - left) / 2;
            match self.at(mid).cmp(&seed) {
                Ordering::Equal => return true,
                Ordering::Less => left = mid,
                Ordering::Greater => right = mid,
            }
        }

        (left..=right).any(|i| self.at(i) == seed)
    }
}
