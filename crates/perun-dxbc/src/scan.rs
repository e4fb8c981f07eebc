//! Locating DXBC containers embedded in larger files.
//!
//! Material and shader-cache files store compiled shaders as raw `DXBC`
//! blobs at arbitrary offsets. A `DXBC` match is only accepted when the
//! header that follows describes a container that fits in the file.

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use memchr::memmem;
use zerocopy::FromBytes;

use crate::container::DxbcHeader;

/// Byte ranges of every plausible container in `data`, in file order.
///
/// Candidates do not overlap: scanning resumes after an accepted container,
/// or one byte after a rejected `DXBC` match.
pub fn find_containers(data: &[u8]) -> Vec<Range<usize>> {
    let finder = memmem::Finder::new(&DxbcHeader::MAGIC.0);
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(hit) = finder.find(&data[pos..]) {
        let start = pos + hit;
        match container_len(&data[start..]) {
            Some(len) => {
                found.push(start..start + len);
                pos = start + len;
            }
            None => {
                debug!("rejected DXBC candidate at {start:#x}");
                pos = start + 1;
            }
        }
    }
    found
}

/// Declared length of the container at the start of `data`, if its header,
/// offset table and chunk headers all fit.
fn container_len(data: &[u8]) -> Option<usize> {
    let (header, rest) = DxbcHeader::read_from_prefix(data).ok()?;
    let size = header.size as usize;
    let count = header.chunk_count as usize;

    let table_end = DxbcHeader::SIZE.checked_add(count.checked_mul(4)?)?;
    if size > data.len() || table_end > size {
        return None;
    }

    let offsets = &rest[..count * 4];
    for index in 0..count {
        let offset = LittleEndian::read_u32(&offsets[index * 4..]) as usize;
        if offset < table_end || offset.checked_add(8)? > size {
            return None;
        }
        let chunk_size = LittleEndian::read_u32(&data[offset + 4..]) as usize;
        if (offset + 8).checked_add(chunk_size)? > size {
            return None;
        }
    }
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_container;

    fn blob() -> Vec<u8> {
        build_container(&[(b"STAT", &[1, 2, 3, 4]), (b"SFI0", &[0; 8])])
    }

    #[test]
    fn test_finds_embedded_containers() {
        let blob = blob();
        let mut file = b"material header".to_vec();
        let first = file.len();
        file.extend_from_slice(&blob);
        file.extend_from_slice(b"padding");
        let second = file.len();
        file.extend_from_slice(&blob);

        assert_eq!(
            find_containers(&file),
            vec![first..first + blob.len(), second..second + blob.len()]
        );
    }

    #[test]
    fn test_rejects_stray_magic() {
        let mut file = b"xxDXBCyy".to_vec();
        assert!(find_containers(&file).is_empty());

        // A truncated container is not accepted.
        let blob = blob();
        file.extend_from_slice(&blob[..blob.len() - 1]);
        assert!(find_containers(&file).is_empty());
    }

    #[test]
    fn test_chunk_past_declared_size() {
        let mut blob = blob();
        let len = blob.len() as u32;
        // Shrink the declared size so the last chunk overruns it.
        blob[24..28].copy_from_slice(&(len - 4).to_le_bytes());
        assert!(find_containers(&blob).is_empty());
    }

    #[test]
    fn test_empty_container() {
        let blob = build_container(&[]);
        assert_eq!(find_containers(&blob), vec![0..32]);
    }
}
