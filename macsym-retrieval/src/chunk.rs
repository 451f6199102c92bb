//! Range-parallel transfer units.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::RetrievalError;

/// One byte range of a chunked transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Position of this chunk in the final file; merging is strictly by
    /// ascending index, never by completion order.
    pub index: usize,
    /// First byte of the range, inclusive.
    pub byte_start: u64,
    /// Last byte of the range, inclusive.
    pub byte_end: u64,
    /// Number of bytes in the range.
    pub size: u64,
    /// Whether the range has been fetched completely.
    pub completed: bool,
    /// The temporary file holding the fetched bytes.
    pub temp_file: Option<PathBuf>,
}

/// Partitions a file of `total_size` bytes into fixed-size chunks.
///
/// The chunk sizes always sum to `total_size`; only the last chunk may be
/// short.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkInfo> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total_size {
        let end = (start + chunk_size - 1).min(total_size - 1);
        chunks.push(ChunkInfo {
            index: chunks.len(),
            byte_start: start,
            byte_end: end,
            size: end - start + 1,
            completed: false,
            temp_file: None,
        });
        start = end + 1;
    }

    chunks
}

/// Concatenates completed chunk files into the final file, ascending by
/// chunk index, and deletes the chunk files afterwards.
///
/// Only called once every chunk succeeded, so an interrupted transfer never
/// leaves a partially-merged output file behind.
pub fn merge_chunks(chunks: &mut [ChunkInfo], target: &Path) -> Result<(), RetrievalError> {
    chunks.sort_by_key(|chunk| chunk.index);

    let mut output = File::create(target)?;
    for chunk in chunks.iter() {
        let temp_file = match chunk.temp_file.as_deref() {
            Some(path) => path,
            None => continue,
        };
        let mut input = File::open(temp_file)?;
        io::copy(&mut input, &mut output)?;
        fs::remove_file(temp_file)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_chunk_sizes_sum_to_total() {
        for (total, chunk_size) in [(100u64, 32u64), (64, 64), (65, 64), (1, 8)] {
            let chunks = plan_chunks(total, chunk_size);
            assert_eq!(chunks.iter().map(|c| c.size).sum::<u64>(), total);
        }
    }

    #[test]
    fn test_chunks_are_contiguous() {
        let chunks = plan_chunks(100, 32);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].byte_start, 0);
        for window in chunks.windows(2) {
            assert_eq!(window[0].byte_end + 1, window[1].byte_start);
        }
        assert_eq!(chunks.last().unwrap().byte_end, 99);
        assert_eq!(chunks.last().unwrap().size, 4);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert!(plan_chunks(0, 32).is_empty());
    }

    #[test]
    fn test_merge_is_index_ordered_and_size_exact() {
        let dir = tempfile::tempdir().unwrap();
        let payload: &[&[u8]] = &[b"aaaa", b"bbbb", b"cc"];

        // Complete the chunks out of order, as a real transfer would.
        let mut chunks = plan_chunks(10, 4);
        for index in [2usize, 0, 1] {
            let path = dir.path().join(format!("chunk_{index:06}.tmp"));
            fs::write(&path, payload[index]).unwrap();
            chunks[index].temp_file = Some(path);
            chunks[index].completed = true;
        }
        chunks.reverse();

        let target = dir.path().join("merged.bin");
        merge_chunks(&mut chunks, &target).unwrap();

        let merged = fs::read(&target).unwrap();
        assert_eq!(merged, b"aaaabbbbcc");
        assert_eq!(merged.len() as u64, 10);
        for chunk in &chunks {
            assert!(!chunk.temp_file.as_deref().unwrap().exists());
        }
    }
}
