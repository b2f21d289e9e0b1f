//! Metric label conversion.
//!
//! Sharded deployments spread one logical collection over many physical names
//! (`orders_0001`, `orders_0002`, ...). Reporting each name as its own label value
//! explodes metric cardinality, so database and collection names pass through a chain
//! of converters before they are used as labels.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;

/// Maps a label to a replacement, or `None` when the rule does not apply.
pub type LabelConverter = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Ordered, append-only list of [`LabelConverter`]s.
#[derive(Default, Clone)]
pub struct LabelConverters {
    converters: Arc<RwLock<Vec<LabelConverter>>>,
}

impl LabelConverters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a converter. Converters run in registration order.
    pub fn add<F>(&self, converter: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.converters.write().push(Arc::new(converter));
    }

    /// Returns the output of the first converter that produces a non-empty label, or
    /// `label` itself when none does.
    pub fn convert(&self, label: &str) -> String {
        self.converters
            .read()
            .iter()
            .find_map(|converter| converter(label).filter(|converted| !converted.is_empty()))
            .unwrap_or_else(|| label.to_string())
    }

    pub fn len(&self) -> usize {
        self.converters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.read().is_empty()
    }
}

impl fmt::Debug for LabelConverters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelConverters")
            .field("len", &self.len())
            .finish()
    }
}

/// A converter collapsing a trailing numeric shard suffix into `*`.
///
/// With `separator = '_'`, `orders_0042` becomes `orders_*`; labels without a numeric
/// suffix are left to the next converter.
pub fn shard_suffix(separator: char) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    move |label: &str| {
        let (base, suffix) = label.rsplit_once(separator)?;

        (!base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
            .then(|| format!("{base}{separator}*"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_label_is_kept() {
        let converters = LabelConverters::new();
        assert_eq!(converters.convert("orders"), "orders");

        converters.add(|_| None);
        assert_eq!(converters.convert("orders"), "orders");
    }

    #[test]
    fn first_non_empty_match_wins() {
        let converters = LabelConverters::new();
        converters.add(|_| Some(String::new()));
        converters.add(|label| label.starts_with("ord").then(|| "first".to_string()));
        converters.add(|_| Some("second".to_string()));

        assert_eq!(converters.convert("orders"), "first");
        assert_eq!(converters.convert("users"), "second");
    }

    #[test]
    fn shard_suffix_collapses_numeric_suffix() {
        let convert = shard_suffix('_');

        assert_eq!(convert("orders_0042").as_deref(), Some("orders_*"));
        assert_eq!(convert("orders_archive"), None);
        assert_eq!(convert("orders"), None);
        assert_eq!(convert("_12"), None);
    }
}
