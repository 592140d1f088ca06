//! Splitting a payload into the parts an upload slot expects.

use std::ops::Range;

use bytes::Bytes;
use docbridge_core::{CoreError, CoreResult, UploadSlot};

/// Byte ranges of parts `1..=total_parts`, in order.
///
/// Every part but the last is exactly `part_size` long and the last is
/// non-empty. A slot that cannot hold the payload that way is an
/// unexpected backend response.
pub(crate) fn part_ranges(size: u64, slot: &UploadSlot) -> CoreResult<Vec<Range<usize>>> {
    let parts = u64::from(slot.total_parts);
    let inconsistent = || {
        CoreError::internal(format!(
            "upload slot {} cannot hold {size} bytes in {} parts of {} bytes",
            slot.id, slot.total_parts, slot.part_size
        ))
    };

    if parts == 0 || slot.part_size == 0 {
        return Err(inconsistent());
    }
    let full = (parts - 1).checked_mul(slot.part_size).ok_or_else(inconsistent)?;
    if full >= size || size - full > slot.part_size {
        return Err(inconsistent());
    }

    let size = usize::try_from(size).map_err(|_| inconsistent())?;
    let part_size = usize::try_from(slot.part_size).map_err(|_| inconsistent())?;
    Ok((0..slot.total_parts as usize)
        .map(|i| {
            let start = i * part_size;
            start..(start + part_size).min(size)
        })
        .collect())
}

/// The payload cut into parts without copying.
pub(crate) fn split(content: &Bytes, slot: &UploadSlot) -> CoreResult<Vec<Bytes>> {
    Ok(part_ranges(content.len() as u64, slot)?
        .into_iter()
        .map(|range| content.slice(range))
        .collect())
}
