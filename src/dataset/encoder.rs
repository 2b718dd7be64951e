//! Dense integer encoding for provider identifiers.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Maps distinct identifier strings onto `0..n` in sorted order.
///
/// Numeric values sort numerically (`"9"` before `"10"`) ahead of text values,
/// which sort lexically.
#[derive(Debug, Clone, Default)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, u32>,
}

impl LabelEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort_by(|a, b| compare_labels(a, b));
        classes.dedup();
        let index = classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (class.clone(), idx as u32))
            .collect();
        Self { classes, index }
    }

    pub fn transform(&self, value: &str) -> Option<u32> {
        self.index.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
