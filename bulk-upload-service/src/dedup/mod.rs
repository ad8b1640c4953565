//! In-sheet double-entry detection.
//!
//! An ordered fold over the frozen field tuples of rows that passed
//! validation. First occurrence wins: the earlier row stays canonical and
//! every later identical tuple is flagged with the earlier row's index.
//! Correctness depends on file order, so this never runs across rows in
//! parallel.

use crate::dtos::{DoubleEntry, RowResult};

pub struct DoubleEntryDetector {
    seen: Vec<(Vec<String>, usize)>,
}

impl DoubleEntryDetector {
    pub fn new() -> Self {
        Self { seen: Vec::new() }
    }

    /// Frozen identifying tuple of a row: every bound field value, in
    /// binding order.
    pub fn row_key(row: &RowResult) -> Vec<String> {
        row.fields.iter().map(|f| f.value.clone()).collect()
    }

    /// Check one row against everything seen so far, recording it as
    /// canonical when new. Only rows that were otherwise valid
    /// participate; invalid rows neither match nor register.
    pub fn check(&mut self, row: &mut RowResult) {
        if !row.valid {
            return;
        }

        let key = Self::row_key(row);
        match self.seen.iter().find(|(seen_key, _)| *seen_key == key) {
            Some((_, first_index)) => {
                row.double_entry = Some(DoubleEntry {
                    double_entry: true,
                    index: *first_index,
                });
                row.valid = false;
                row.is_select = false;
            }
            None => self.seen.push((key, row.index)),
        }
    }
}

impl Default for DoubleEntryDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::FieldResult;

    fn row(index: usize, values: &[&str], valid: bool) -> RowResult {
        RowResult {
            index,
            is_select: valid,
            is_removed: false,
            is_keep: false,
            is_duplicate: false,
            duplicate: None,
            double_entry: None,
            issue_count: u32::from(!valid),
            valid,
            fields: values
                .iter()
                .map(|v| FieldResult {
                    field: "field".to_string(),
                    field_type: "text".to_string(),
                    value: v.to_string(),
                    valid: true,
                    message: None,
                    meta: None,
                })
                .collect(),
        }
    }

    #[test]
    fn later_identical_row_references_the_first() {
        let mut detector = DoubleEntryDetector::new();
        let mut first = row(0, &["Anjuna", "X", "100"], true);
        let mut second = row(1, &["Anjuna", "X", "100"], true);

        detector.check(&mut first);
        detector.check(&mut second);

        assert!(first.valid);
        assert!(first.double_entry.is_none());

        let flag = second.double_entry.expect("second row flagged");
        assert!(flag.double_entry);
        assert_eq!(flag.index, 0);
        assert!(!second.valid);
    }

    #[test]
    fn distinct_tuples_pass() {
        let mut detector = DoubleEntryDetector::new();
        let mut first = row(0, &["Anjuna", "X", "100"], true);
        let mut second = row(1, &["Anjuna", "X", "200"], true);

        detector.check(&mut first);
        detector.check(&mut second);

        assert!(second.double_entry.is_none());
        assert!(second.valid);
    }

    #[test]
    fn invalid_rows_do_not_register_as_canonical() {
        let mut detector = DoubleEntryDetector::new();
        let mut bad = row(0, &["Anjuna", "X", "100"], false);
        let mut good = row(1, &["Anjuna", "X", "100"], true);
        let mut later = row(2, &["Anjuna", "X", "100"], true);

        detector.check(&mut bad);
        detector.check(&mut good);
        detector.check(&mut later);

        // The invalid row neither matched nor claimed the tuple; the
        // first valid occurrence is canonical.
        assert!(bad.double_entry.is_none());
        assert!(good.double_entry.is_none());
        assert_eq!(later.double_entry.unwrap().index, 1);
    }

    #[test]
    fn three_identical_rows_all_point_at_row_zero() {
        let mut detector = DoubleEntryDetector::new();
        let mut rows: Vec<RowResult> = (0..3).map(|i| row(i, &["a", "b"], true)).collect();
        for r in rows.iter_mut() {
            detector.check(r);
        }

        assert!(rows[0].double_entry.is_none());
        assert_eq!(rows[1].double_entry.as_ref().unwrap().index, 0);
        assert_eq!(rows[2].double_entry.as_ref().unwrap().index, 0);
    }
}
