//! Boot-time category loading and weighted random selection.
//!
//! The registry probes `NNN.seeds.gz` for every number in 1–255 once at
//! startup; anything that fails to load is skipped with a log line and
//! never retried. What loads is immutable for the life of the process and
//! indexed by number and by url slug. Slug collisions between loaded
//! categories are a configuration error and abort boot.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    archive::SeedArchive,
    config::{Salt, Tunables},
    throttle::{Role, Throttle},
};

/// One loaded seed category and its issuance gate.
#[derive(Debug)]
pub struct Category {
    number: u8,
    archive: SeedArchive,
    gen_interval: Duration,
    throttle: Throttle,
}

impl Category {
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn url(&self) -> &str {
        self.archive.url()
    }

    pub fn name(&self) -> &str {
        self.archive.name()
    }

    pub fn seed_count(&self) -> usize {
        self.archive.seed_count()
    }

    /// Minimum spacing between issuances from this category.
    pub fn gen_interval(&self) -> Duration {
        self.gen_interval
    }

    pub(crate) fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn contains(&self, seed: u64) -> bool {
        self.archive.contains(seed)
    }

    /// Draw a uniformly random seed by rejection sampling the index.
    pub fn draw_seed(&self) -> [u8; 8] {
        let n = self.archive.seed_count() as u64;
        debug_assert!(n > 0);
        let bits = self.archive.seed_bits();
        let mask = if bits == 0 { 0 } else { u64::MAX >> (64 - bits) };
        let mut rng = rand::rng();
        let idx = loop {
            let r = rng.next_u64() & mask;
            if r < n {
                break r;
            }
        };
        self.archive.seed_at(idx as usize)
    }
}

/// Fatal boot problems. Anything recoverable is just a skipped category.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("no loadable seed categories under {}", .0.display())]
    NoCategories(PathBuf),
    #[error("categories {first} and {second} share the url slug '{slug}'")]
    SlugCollision { slug: String, first: u8, second: u8 },
}

/// Every category the service knows about, plus the global verification
/// gate.
#[derive(Debug)]
pub struct Registry {
    categories: Vec<Arc<Category>>,
    by_number: HashMap<u8, Arc<Category>>,
    by_slug: HashMap<String, Arc<Category>>,
    /// Cumulative seed counts in load order; `cumulative.last() == total`.
    cumulative: Vec<u64>,
    total: u64,
    verify_throttle: Throttle,
    verify_interval: Duration,
}

impl Registry {
    /// Probe and load every category under `tunables.seed_dir`.
    pub fn load(tunables: &Tunables, salt: &Salt) -> Result<Self, BootError> {
        let mut categories = Vec::new();
        for number in 1..=u8::MAX {
            let path = tunables.seed_dir.join(format!("{number:03}.seeds.gz"));
            let archive = match SeedArchive::load(&path, true) {
                Ok(archive) => archive,
                Err(err) => {
                    debug!(number, %err, "skipping category");
                    continue;
                }
            };
            if archive.seed_count() == 0 {
                debug!(number, "skipping category with an empty seed table");
                continue;
            }
            let gen_interval = tunables.gen_interval(archive.seed_count());
            let throttle = Throttle::new(
                &tunables.scratch_dir,
                salt,
                number,
                Role::Issue,
                tunables.lock_timeout,
            );
            info!(number, url = archive.url(), seeds = archive.seed_count(), "loaded category");
            categories.push(Arc::new(Category { number, archive, gen_interval, throttle }));
        }

        Self::assemble(categories, tunables, salt)
    }

    fn assemble(
        categories: Vec<Arc<Category>>,
        tunables: &Tunables,
        salt: &Salt,
    ) -> Result<Self, BootError> {
        if categories.is_empty() {
            return Err(BootError::NoCategories(tunables.seed_dir.clone()));
        }

        let mut by_number = HashMap::new();
        let mut by_slug: HashMap<String, Arc<Category>> = HashMap::new();
        let mut cumulative = Vec::with_capacity(categories.len());
        let mut total = 0u64;
        for category in &categories {
            if let Some(previous) = by_slug.get(category.url()) {
                return Err(BootError::SlugCollision {
                    slug: category.url().to_owned(),
                    first: previous.number(),
                    second: category.number(),
                });
            }
            by_number.insert(category.number(), Arc::clone(category));
            by_slug.insert(category.url().to_owned(), Arc::clone(category));
            total += category.seed_count() as u64;
            cumulative.push(total);
        }

        // number 0 is reserved, which makes it a natural owner for the
        // category-independent verification gate
        let verify_throttle = Throttle::new(
            &tunables.scratch_dir,
            salt,
            0,
            Role::Verify,
            tunables.lock_timeout,
        );

        Ok(Self {
            categories,
            by_number,
            by_slug,
            cumulative,
            total,
            verify_throttle,
            verify_interval: tunables.verify_interval(),
        })
    }

    pub fn by_number(&self, number: u8) -> Option<&Arc<Category>> {
        self.by_number.get(&number)
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Arc<Category>> {
        self.by_slug.get(slug)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Total seeds across all categories.
    pub fn total_seeds(&self) -> u64 {
        self.total
    }

    pub(crate) fn verify_throttle(&self) -> &Throttle {
        &self.verify_throttle
    }

    pub(crate) fn verify_interval(&self) -> Duration {
        self.verify_interval
    }

    /// Pick a category with probability proportional to its seed count.
    pub fn pick_weighted(&self) -> &Arc<Category> {
        let r = draw_below(self.total);
        let idx = self.cumulative.partition_point(|&c| c <= r);
        &self.categories[idx]
    }
}

/// Uniform draw from `[0, bound)` by rejection sampling `⌈log₂ bound⌉`
/// bits at a time.
fn draw_below(bound: u64) -> u64 {
    debug_assert!(bound > 0);
    if bound == 1 {
        return 0;
    }
    let bits = 64 - (bound - 1).leading_zeros();
    let mask = u64::MAX >> (64 - bits);
    let mut rng = rand::rng();
    loop {
        let r = rng.next_u64() & mask;
        if r < bound {
            return r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    fn write_archive(dir: &std::path::Path, number: u8, url: &str, seeds: Vec<u64>) {
        let archive = SeedArchive::new(url, format!("Category {url}"), seeds).unwrap();
        let path = dir.join(format!("{number:03}.seeds.gz"));
        let file = File::create(path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut packed = Vec::new();
        archive.pack(&mut packed).unwrap();
        encoder.write_all(&packed).unwrap();
        encoder.finish().unwrap();
    }

    fn tunables(seed_dir: &std::path::Path, scratch: &std::path::Path) -> Tunables {
        Tunables {
            seed_dir: seed_dir.to_path_buf(),
            scratch_dir: scratch.to_path_buf(),
            ..Tunables::default()
        }
    }

    #[test]
    fn loads_categories_and_skips_gaps() {
        let seeds = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_archive(seeds.path(), 1, "rsg", vec![1, 2, 3]);
        write_archive(seeds.path(), 7, "ssg", vec![10, 20]);
        // a corrupt file must be skipped, not fatal
        std::fs::write(seeds.path().join("009.seeds.gz"), b"not gzip").unwrap();

        let salt = Salt::new(vec![9; 32]).unwrap();
        let registry = Registry::load(&tunables(seeds.path(), scratch.path()), &salt).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.total_seeds(), 5);
        assert_eq!(registry.by_number(1).unwrap().url(), "rsg");
        assert_eq!(registry.by_slug("ssg").unwrap().number(), 7);
        assert!(registry.by_number(9).is_none());
        assert!(registry.by_slug("nope").is_none());
    }

    #[test]
    fn empty_seed_dir_is_fatal() {
        let seeds = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let salt = Salt::new(vec![9; 32]).unwrap();
        let err = Registry::load(&tunables(seeds.path(), scratch.path()), &salt).unwrap_err();
        assert!(matches!(err, BootError::NoCategories(_)));
    }

    #[test]
    fn slug_collisions_are_fatal() {
        let seeds = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_archive(seeds.path(), 1, "rsg", vec![1]);
        write_archive(seeds.path(), 2, "rsg", vec![2]);
        let salt = Salt::new(vec![9; 32]).unwrap();
        let err = Registry::load(&tunables(seeds.path(), scratch.path()), &salt).unwrap_err();
        assert!(matches!(
            err,
            BootError::SlugCollision { first: 1, second: 2, .. }
        ));
    }

    #[test]
    fn weighted_pick_tracks_seed_population() {
        let seeds = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_archive(seeds.path(), 1, "big", (0..900).collect());
        write_archive(seeds.path(), 2, "small", (1000..1100).collect());
        let salt = Salt::new(vec![9; 32]).unwrap();
        let registry = Registry::load(&tunables(seeds.path(), scratch.path()), &salt).unwrap();

        let mut big = 0;
        for _ in 0..2000 {
            if registry.pick_weighted().url() == "big" {
                big += 1;
            }
        }
        // expectation 1800 of 2000; even ±6 sigma stays well inside
        assert!((1650..=1950).contains(&big), "picked big {big}/2000 times");
    }

    #[test]
    fn draw_below_stays_in_range() {
        for bound in [1u64, 2, 3, 5, 900, 1 << 33] {
            for _ in 0..200 {
                assert!(draw_below(bound) < bound);
            }
        }
    }

    #[test]
    fn draw_seed_returns_loaded_seeds() {
        let seeds = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        write_archive(seeds.path(), 3, "rsg", vec![5, 6, 7, 8, 9]);
        let salt = Salt::new(vec![9; 32]).unwrap();
        let registry = Registry::load(&tunables(seeds.path(), scratch.path()), &salt).unwrap();
        let category = registry.by_number(3).unwrap();
        for _ in 0..100 {
            let seed = u64::from_be_bytes(category.draw_seed());
            assert!((5..=9).contains(&seed));
            assert!(category.contains(seed));
        }
    }
}
