// Oryx Sorting
// Stable adaptive merge sort: short partitions are insertion sorted, merges
// skip partitions that are already in order and gallop over runs.

use crate::error::{OryxError, OryxResult};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortCase {
    #[default]
    Sensitive,
    Insensitive,
}

/// How stem values are compared once they have been turned into strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub order: SortOrder,
    pub case: SortCase,
    /// 1-based first byte of the compared column
    pub first_column: usize,
    /// Column width; `None` compares to the end of the string
    pub column_length: Option<usize>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            order: SortOrder::Ascending,
            case: SortCase::Sensitive,
            first_column: 1,
            column_length: None,
        }
    }
}

impl SortOptions {
    /// Parse the Rexx option letters: order "A"/"D", case "C"/"I"
    pub fn parse(order: Option<&str>, case: Option<&str>) -> OryxResult<Self> {
        let mut options = Self::default();
        if let Some(order) = order {
            options.order = match order.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('A') => SortOrder::Ascending,
                Some('D') => SortOrder::Descending,
                _ => {
                    return Err(OryxError::invalid_argument(format!(
                        "Sort order must be \"A\" or \"D\", found \"{}\"",
                        order
                    )))
                }
            };
        }
        if let Some(case) = case {
            options.case = match case.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('C') => SortCase::Sensitive,
                Some('I') => SortCase::Insensitive,
                _ => {
                    return Err(OryxError::invalid_argument(format!(
                        "Sort case must be \"C\" or \"I\", found \"{}\"",
                        case
                    )))
                }
            };
        }
        Ok(options)
    }

    pub fn with_columns(mut self, first_column: usize, column_length: Option<usize>) -> OryxResult<Self> {
        if first_column == 0 {
            return Err(OryxError::invalid_argument("Sort column must be a positive whole number"));
        }
        if column_length == Some(0) {
            return Err(OryxError::invalid_argument("Sort column length must be a positive whole number"));
        }
        self.first_column = first_column;
        self.column_length = column_length;
        Ok(self)
    }

    fn column<'a>(&self, s: &'a str) -> &'a [u8] {
        let bytes = s.as_bytes();
        let start = self.first_column - 1;
        if start >= bytes.len() {
            return &[];
        }
        let end = match self.column_length {
            Some(length) => (start + length).min(bytes.len()),
            None => bytes.len(),
        };
        &bytes[start..end]
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let (a, b) = (self.column(a), self.column(b));
        let ordering = match self.case {
            SortCase::Sensitive => a.cmp(b),
            SortCase::Insensitive => a
                .iter()
                .map(|c| c.to_ascii_uppercase())
                .cmp(b.iter().map(|c| c.to_ascii_uppercase())),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Sort `items` in place, stable with respect to `compare`.
pub fn merge_sort<T, F>(items: &mut [T], cutoff: usize, mut compare: F)
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    let mut scratch = Vec::with_capacity(items.len() / 2 + 1);
    sort_range(items, cutoff.max(1), &mut scratch, &mut compare);
}

fn sort_range<T, F>(items: &mut [T], cutoff: usize, scratch: &mut Vec<T>, compare: &mut F)
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    if items.len() <= cutoff {
        insertion_sort(items, compare);
        return;
    }
    let mid = items.len() / 2;
    sort_range(&mut items[..mid], cutoff, scratch, compare);
    sort_range(&mut items[mid..], cutoff, scratch, compare);
    merge(items, mid, scratch, compare);
}

fn insertion_sort<T, F>(items: &mut [T], compare: &mut F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Where an element equal to the pivot lands when searching a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    /// Equal elements stay in front of the pivot (left run searched for a right pivot)
    AfterEqual,
    /// Equal elements go behind the pivot (right run searched for a left pivot)
    BeforeEqual,
}

/// First index in `[low, high)` whose element does not precede `pivot`.
/// Gallops exponentially, then binary searches the last gap.
fn find<T, F>(run: &[T], mut low: usize, high: usize, pivot: &T, bias: Bias, compare: &mut F) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut precedes = |item: &T| match bias {
        Bias::AfterEqual => compare(item, pivot) != Ordering::Greater,
        Bias::BeforeEqual => compare(item, pivot) == Ordering::Less,
    };

    let mut bound = high;
    let mut step = 1;
    loop {
        let probe = low + step - 1;
        if probe >= high {
            break;
        }
        if precedes(&run[probe]) {
            low = probe + 1;
            step *= 2;
        } else {
            bound = probe;
            break;
        }
    }

    while low < bound {
        let mid = low + (bound - low) / 2;
        if precedes(&run[mid]) {
            low = mid + 1;
        } else {
            bound = mid;
        }
    }
    low
}

/// Merge the sorted halves `items[..mid]` and `items[mid..]`
fn merge<T, F>(items: &mut [T], mid: usize, scratch: &mut Vec<T>, compare: &mut F)
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    // already in order: nothing to move
    if compare(&items[mid - 1], &items[mid]) != Ordering::Greater {
        return;
    }

    scratch.clear();
    scratch.extend_from_slice(&items[..mid]);

    let len = items.len();
    let (mut left, mut right, mut out) = (0, mid, 0);
    while left < scratch.len() && right < len {
        if compare(&scratch[left], &items[right]) != Ordering::Greater {
            let pivot = items[right].clone();
            let end = find(scratch, left + 1, scratch.len(), &pivot, Bias::AfterEqual, compare);
            for item in &scratch[left..end] {
                items[out] = item.clone();
                out += 1;
            }
            left = end;
        } else {
            let end = find(items, right + 1, len, &scratch[left], Bias::BeforeEqual, compare);
            // out trails right, so the run moves down without overlap issues
            for k in right..end {
                items[out] = items[k].clone();
                out += 1;
            }
            right = end;
        }
    }
    for item in &scratch[left..] {
        items[out] = item.clone();
        out += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_copy(values: &[i32], cutoff: usize) -> Vec<i32> {
        let mut copy = values.to_vec();
        merge_sort(&mut copy, cutoff, |a, b| a.cmp(b));
        copy
    }

    #[test]
    fn test_sorts_like_std() {
        let mut seed: u32 = 12345;
        let values: Vec<i32> = (0..500)
            .map(|_| {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                ((seed >> 16) % 97) as i32
            })
            .collect();
        let mut expected = values.clone();
        expected.sort();
        for cutoff in [1, 2, 7, 16] {
            assert_eq!(sorted_copy(&values, cutoff), expected, "cutoff {}", cutoff);
        }
    }

    #[test]
    fn test_small_inputs() {
        assert_eq!(sorted_copy(&[], 7), Vec::<i32>::new());
        assert_eq!(sorted_copy(&[1], 7), vec![1]);
        assert_eq!(sorted_copy(&[2, 1], 1), vec![1, 2]);
    }

    #[test]
    fn test_stable() {
        let mut pairs: Vec<(u8, usize)> = (0..100).map(|i| ((i % 5) as u8, i)).collect();
        merge_sort(&mut pairs, 7, |a, b| a.0.cmp(&b.0));
        for window in pairs.windows(2) {
            let (a, b) = (window[0], window[1]);
            assert!(a.0 < b.0 || (a.0 == b.0 && a.1 < b.1));
        }
    }

    #[test]
    fn test_presorted_input_is_cheap() {
        let mut values: Vec<usize> = (0..1024).collect();
        let mut comparisons = 0;
        merge_sort(&mut values, 7, |a, b| {
            comparisons += 1;
            a.cmp(b)
        });
        // insertion sorted leaves plus one check per merge
        assert!(comparisons < 2 * 1024, "{} comparisons", comparisons);
    }

    #[test]
    fn test_descending_and_caseless() {
        let options = SortOptions::parse(Some("D"), Some("I")).unwrap();
        let mut words = vec!["b", "A", "c", "a"];
        merge_sort(&mut words, 7, |a, b| options.compare(a, b));
        assert_eq!(words, vec!["c", "b", "A", "a"]);
    }

    #[test]
    fn test_column_compare() {
        let options = SortOptions::default().with_columns(3, Some(2)).unwrap();
        assert_eq!(options.compare("zzab", "aaac"), Ordering::Less);
        // shorter than the column start compares as empty
        assert_eq!(options.compare("x", "aaaa"), Ordering::Less);
        assert!(SortOptions::default().with_columns(0, None).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_letters() {
        assert!(SortOptions::parse(Some("X"), None).is_err());
        assert!(SortOptions::parse(None, Some("Q")).is_err());
        assert_eq!(SortOptions::parse(None, None).unwrap(), SortOptions::default());
    }
}
