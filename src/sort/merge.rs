use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Merges `k` already-sorted runs into one sorted sequence in O(N log k)
/// using a min-heap keyed by (value, source index). Equal values come out in
/// source order.
pub fn merge_sorted(mut runs: Vec<Vec<i64>>) -> Vec<i64> {
    match runs.len() {
        0 => Vec::new(),
        1 => runs.swap_remove(0),
        _ => {
            let total = runs.iter().map(Vec::len).sum();
            let mut merged = Vec::with_capacity(total);
            let mut cursors = vec![0usize; runs.len()];
            let mut heap = BinaryHeap::with_capacity(runs.len());

            for (source, run) in runs.iter().enumerate() {
                if let Some(&first) = run.first() {
                    heap.push(Reverse((first, source)));
                }
            }
            while let Some(Reverse((value, source))) = heap.pop() {
                merged.push(value);
                cursors[source] += 1;
                if let Some(&next) = runs[source].get(cursors[source]) {
                    heap.push(Reverse((next, source)));
                }
            }
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn merge_no_runs() {
        assert_eq!(merge_sorted(vec![]), Vec::<i64>::new());
    }

    #[test]
    fn merge_single_run() {
        assert_eq!(merge_sorted(vec![vec![1, 2, 3]]), vec![1, 2, 3]);
    }

    #[test]
    fn merge_three_runs() {
        let runs = vec![vec![2, 9], vec![1, 7], vec![3, 8]];
        assert_eq!(merge_sorted(runs), vec![1, 2, 3, 7, 8, 9]);
    }

    #[test]
    fn merge_skips_empty_runs() {
        let runs = vec![vec![], vec![4, 5], vec![], vec![1]];
        assert_eq!(merge_sorted(runs), vec![1, 4, 5]);
    }

    #[test]
    fn merge_with_duplicates() {
        let runs = vec![vec![1, 3, 3], vec![3, 4], vec![0, 3]];
        assert_eq!(merge_sorted(runs), vec![0, 1, 3, 3, 3, 3, 4]);
    }

    #[test]
    fn merge_with_negative_values() {
        let runs = vec![vec![-5, 0, 2], vec![-9, -1]];
        assert_eq!(merge_sorted(runs), vec![-9, -5, -1, 0, 2]);
    }

    #[quickcheck]
    fn merge_equals_global_sort(runs: Vec<Vec<i64>>) -> bool {
        let sorted_runs: Vec<Vec<i64>> = runs
            .into_iter()
            .map(|mut run| {
                run.sort_unstable();
                run
            })
            .collect();
        let mut expected: Vec<i64> =
            sorted_runs.iter().flatten().copied().collect();
        expected.sort_unstable();
        merge_sorted(sorted_runs) == expected
    }
}
