use rustc_hash::FxHashSet;

use crate::constants::ANONYMOUS_ATTRIBUTE_PREFIX;

/// `true` for temporary attributes that only live as long as something asks for them.
pub fn is_anonymous_attribute_name(name: &str) -> bool {
    name.starts_with(ANONYMOUS_ATTRIBUTE_PREFIX)
}

/// Decides which anonymous attributes survive an operation that builds new geometry.
///
/// Named attributes always propagate. Anonymous ones only propagate when every attribute
/// is requested or when they are listed explicitly.
#[derive(Clone, Debug)]
pub struct AttributeFilter {
    propagate_all: bool,
    names: FxHashSet<String>,
}

impl Default for AttributeFilter {
    fn default() -> Self {
        Self::propagate_all()
    }
}

impl AttributeFilter {
    /// Keep everything.
    pub fn propagate_all() -> Self {
        Self {
            propagate_all: true,
            names: FxHashSet::default(),
        }
    }

    /// Keep named attributes plus the given anonymous ones.
    pub fn propagate_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            propagate_all: false,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the attribute does not have to be propagated.
    pub fn allow_skip(&self, name: &str) -> bool {
        if self.propagate_all || !is_anonymous_attribute_name(name) {
            return false;
        }
        !self.names.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unrequested_anonymous_attributes_are_skipped() {
        let filter = AttributeFilter::propagate_only([".a_keep"]);
        assert!(!filter.allow_skip("color"));
        assert!(!filter.allow_skip(".a_keep"));
        assert!(filter.allow_skip(".a_drop"));
        assert!(!AttributeFilter::default().allow_skip(".a_drop"));
    }
}
