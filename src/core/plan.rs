//! Purpose: Split bulk inputs into request-sized chunks without performing any I/O.
//! Exports: `plan_chunks`.
//! Role: Pure planning layer used by collection bulk operations before dispatch.
//! Invariants: Concatenating the chunks in order reproduces the input exactly once.
//! Invariants: Every chunk holds at most `chunk_size` items; only counts are planned,
//! never sub-item splits.
use crate::core::error::{Error, ErrorKind};

/// Split `items` into `⌈N/chunk_size⌉` chunks of at most `chunk_size` items,
/// preserving order. Zero items produce zero chunks.
pub fn plan_chunks<T>(items: Vec<T>, chunk_size: usize) -> Result<Vec<Vec<T>>, Error> {
    if chunk_size == 0 {
        return Err(Error::new(ErrorKind::Validation).with_message("chunk size must be positive"));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::plan_chunks;
    use crate::core::error::ErrorKind;

    #[test]
    fn empty_input_plans_zero_chunks() {
        let chunks = plan_chunks(Vec::<u32>::new(), 10).expect("plan");
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = plan_chunks(vec![1, 2, 3], 0).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn exact_multiple_splits_evenly() {
        let chunks = plan_chunks((0..6).collect(), 3).expect("plan");
        assert_eq!(chunks, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn remainder_lands_in_final_chunk() {
        let chunks = plan_chunks((0..7).collect(), 3).expect("plan");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], vec![6]);
    }

    #[test]
    fn single_oversize_item_is_not_split() {
        let big = vec![0u8; 4096];
        let chunks = plan_chunks(vec![big.clone()], 1).expect("plan");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0][0], big);
    }

    #[test]
    fn prop_concatenation_reproduces_input() {
        for n in 0usize..40 {
            for chunk_size in 1usize..8 {
                let input: Vec<usize> = (0..n).collect();
                let chunks = plan_chunks(input.clone(), chunk_size).expect("plan");
                assert_eq!(chunks.len(), n.div_ceil(chunk_size));
                assert!(chunks.iter().all(|chunk| chunk.len() <= chunk_size));
                let rebuilt: Vec<usize> = chunks.into_iter().flatten().collect();
                assert_eq!(rebuilt, input);
            }
        }
    }
}
