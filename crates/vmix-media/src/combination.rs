//! Cartesian product of per-block video lists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// One pick of exactly one file per video block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// 1-based position in enumeration order
    pub index: usize,
    /// Chosen files, one per block, in block-name order
    pub files: Vec<PathBuf>,
    /// Zero-pad width shared by every combination of the same batch
    width: usize,
}

impl Combination {
    /// Output file name, e.g. `combo_007.mp4`.
    pub fn file_name(&self) -> String {
        format!("combo_{:0width$}.mp4", self.index, width = self.width)
    }

    /// Human-readable label made of the chosen file stems.
    pub fn label(&self) -> String {
        self.files
            .iter()
            .map(|f| {
                f.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Block maps accepted by [`enumerate`].
pub trait VideoBlocks {
    /// Blocks sorted by name.
    fn sorted_blocks(&self) -> Vec<(&str, &[PathBuf])>;
}

impl VideoBlocks for BTreeMap<String, Vec<PathBuf>> {
    fn sorted_blocks(&self) -> Vec<(&str, &[PathBuf])> {
        self.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect()
    }
}

impl VideoBlocks for HashMap<String, Vec<PathBuf>> {
    fn sorted_blocks(&self) -> Vec<(&str, &[PathBuf])> {
        let mut blocks: Vec<_> = self.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
        blocks.sort_by(|a, b| a.0.cmp(b.0));
        blocks
    }
}

impl VideoBlocks for Vec<(String, Vec<PathBuf>)> {
    fn sorted_blocks(&self) -> Vec<(&str, &[PathBuf])> {
        let mut blocks: Vec<_> = self.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
        blocks.sort_by(|a, b| a.0.cmp(b.0));
        blocks
    }
}

/// Number of combinations the blocks would produce, `None` on overflow.
pub fn combination_count(blocks: &impl VideoBlocks) -> Option<usize> {
    let sorted = blocks.sorted_blocks();
    if sorted.is_empty() || sorted.iter().any(|(_, files)| files.is_empty()) {
        return Some(0);
    }
    sorted
        .iter()
        .try_fold(1usize, |acc, (_, files)| acc.checked_mul(files.len()))
}

/// Enumerate every combination, blocks ordered by name.
///
/// The last block varies fastest. Any empty block (or no blocks at all)
/// yields an empty list. A product above `limit` is refused before
/// anything is allocated.
pub fn enumerate(blocks: &impl VideoBlocks, limit: usize) -> MediaResult<Vec<Combination>> {
    let sorted = blocks.sorted_blocks();
    let total = match combination_count(blocks) {
        Some(n) if n <= limit => n,
        found => return Err(MediaError::TooManyCombinations { found, limit }),
    };
    if total == 0 {
        return Ok(Vec::new());
    }

    let width = total.to_string().len().max(3);
    let lists: Vec<&[PathBuf]> = sorted.iter().map(|(_, files)| *files).collect();

    let mut combinations = Vec::with_capacity(total);
    let mut cursor = vec![0usize; lists.len()];

    for index in 1..=total {
        let files = cursor
            .iter()
            .zip(&lists)
            .map(|(&i, list)| list[i].clone())
            .collect();
        combinations.push(Combination {
            index,
            files,
            width,
        });

        // Odometer increment, rightmost block first
        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < lists[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    Ok(combinations)
}

/// Output path of a combination inside `dir`.
pub fn output_path(dir: &Path, combination: &Combination) -> PathBuf {
    dir.join(combination.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 10_000;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_two_blocks_in_name_order() {
        let mut blocks = BTreeMap::new();
        blocks.insert("block2".to_string(), paths(&["x.mp4", "y.mp4"]));
        blocks.insert("block1".to_string(), paths(&["a.mp4", "b.mp4"]));

        let combos = enumerate(&blocks, LIMIT).unwrap();
        let labels: Vec<_> = combos.iter().map(Combination::label).collect();
        assert_eq!(labels, vec!["a_x", "a_y", "b_x", "b_y"]);
        assert_eq!(combos[0].file_name(), "combo_001.mp4");
        assert_eq!(combos[3].file_name(), "combo_004.mp4");
    }

    #[test]
    fn test_count_is_product_of_block_sizes() {
        let mut blocks = BTreeMap::new();
        blocks.insert("a".to_string(), paths(&["1", "2", "3"]));
        blocks.insert("b".to_string(), paths(&["4", "5"]));
        blocks.insert("c".to_string(), paths(&["6", "7", "8", "9"]));

        let combos = enumerate(&blocks, LIMIT).unwrap();
        assert_eq!(combos.len(), 24);
        assert_eq!(combination_count(&blocks), Some(24));
        assert!(combos.iter().all(|c| c.len() == 3));

        let mut names: Vec<_> = combos.iter().map(Combination::file_name).collect();
        names.dedup();
        assert_eq!(names.len(), 24);
    }

    #[test]
    fn test_empty_block_yields_nothing() {
        let mut blocks = BTreeMap::new();
        blocks.insert("a".to_string(), paths(&["1.mp4"]));
        blocks.insert("b".to_string(), Vec::new());
        assert!(enumerate(&blocks, LIMIT).unwrap().is_empty());

        let none: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        assert!(enumerate(&none, LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward = vec![
            ("intro".to_string(), paths(&["i1.mp4", "i2.mp4"])),
            ("outro".to_string(), paths(&["o1.mp4", "o2.mp4", "o3.mp4"])),
        ];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();
        let hashed: HashMap<_, _> = forward.iter().cloned().collect();

        let expected = enumerate(&forward, LIMIT).unwrap();
        assert_eq!(expected, enumerate(&reversed, LIMIT).unwrap());
        assert_eq!(expected, enumerate(&hashed, LIMIT).unwrap());
    }

    #[test]
    fn test_pad_width_grows_past_999() {
        let mut blocks = BTreeMap::new();
        blocks.insert("a".to_string(), (0..50).map(|i| PathBuf::from(format!("a{i}"))).collect());
        blocks.insert("b".to_string(), (0..25).map(|i| PathBuf::from(format!("b{i}"))).collect());

        let combos = enumerate(&blocks, LIMIT).unwrap();
        assert_eq!(combos.len(), 1250);
        assert_eq!(combos[0].file_name(), "combo_0001.mp4");
        assert_eq!(combos[1249].file_name(), "combo_1250.mp4");
    }

    #[test]
    fn test_product_above_limit_is_refused() {
        let mut blocks = BTreeMap::new();
        blocks.insert("a".to_string(), paths(&["1", "2", "3"]));
        blocks.insert("b".to_string(), paths(&["4", "5"]));

        assert_eq!(enumerate(&blocks, 6).unwrap().len(), 6);
        assert!(matches!(
            enumerate(&blocks, 5),
            Err(MediaError::TooManyCombinations {
                found: Some(6),
                limit: 5
            })
        ));
    }

    #[test]
    fn test_overflowing_product_does_not_allocate() {
        let block: Vec<PathBuf> = (0..300).map(|i| PathBuf::from(format!("{i}.mp4"))).collect();
        let blocks: BTreeMap<String, Vec<PathBuf>> =
            (0..8).map(|b| (format!("block{b}"), block.clone())).collect();

        assert_eq!(combination_count(&blocks), None);
        assert!(matches!(
            enumerate(&blocks, usize::MAX),
            Err(MediaError::TooManyCombinations { found: None, .. })
        ));
    }
}
