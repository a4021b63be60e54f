use std::collections::BTreeMap;

/// A single extracted feature value.
///
/// Most features are numeric, but extractors are allowed to report a short
/// status string in place of a number (e.g. `"timeout"`, `"n/a"`) for a
/// feature they could not compute without failing the whole job.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// A numeric feature value.
    Number(f64),
    /// A short status string in place of a number.
    Status(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Number(v as f64)
    }
}

/// Feature name to value mapping produced by one extraction run.
///
/// Ordered (`BTreeMap`) so that two runs over the same input produce
/// byte-identical serialized output.
pub type FeatureMap = BTreeMap<String, FeatureValue>;
