//! Named, typed, domain-tagged attribute columns.
//!
//! Geometry types own an [`AttributeMap`] and expose it through [`AttributeOwner`], which also
//! knows how many elements each domain has and how to move values between domains.

pub mod array;
pub mod filter;
pub mod types;

pub use array::{AttributeArray, AttributeElement, AttributeValue};
pub use filter::{AttributeFilter, is_anonymous_attribute_name};
pub use types::{AttrDomain, AttrType, AttributeMeta};

/// One named column.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    name: String,
    domain: AttrDomain,
    values: AttributeArray,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> AttrDomain {
        self.domain
    }

    pub fn data_type(&self) -> AttrType {
        self.values.data_type()
    }

    pub fn meta(&self) -> AttributeMeta {
        AttributeMeta {
            domain: self.domain,
            data_type: self.data_type(),
        }
    }

    pub fn values(&self) -> &AttributeArray {
        &self.values
    }

    /// Mutable access to the values. The length must not change.
    pub fn values_mut(&mut self) -> &mut AttributeArray {
        &mut self.values
    }
}

/// Ordered set of uniquely named attributes.
///
/// The map doesn't know domain sizes; whoever owns it keeps each column as long as its domain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeMap {
    attributes: Vec<Attribute>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }

    /// The values of an attribute, if it exists and is stored as `T`.
    pub fn lookup_typed<T: AttributeElement>(&self, name: &str) -> Option<&[T]> {
        self.lookup(name).and_then(|a| a.values.typed())
    }

    pub fn lookup_typed_mut<T: AttributeElement>(&mut self, name: &str) -> Option<&mut [T]> {
        self.lookup_mut(name).and_then(|a| a.values.typed_mut())
    }

    /// Add a new attribute. Returns `false` (and does nothing) if the name is taken.
    pub fn add(&mut self, name: impl Into<String>, domain: AttrDomain, values: impl Into<AttributeArray>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.attributes.push(Attribute {
            name,
            domain,
            values: values.into(),
        });
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index))
    }

    /// Keep only the attributes for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Attribute) -> bool) {
        self.attributes.retain(|a| keep(a));
    }

    /// Get a column to overwrite completely.
    ///
    /// An existing attribute with the same domain and type is returned as is; anything else
    /// under that name is replaced by a default-filled column of `domain_size` elements.
    pub fn lookup_or_add_for_write_only_span(
        &mut self,
        name: &str,
        domain: AttrDomain,
        data_type: AttrType,
        domain_size: usize,
    ) -> &mut AttributeArray {
        let index = match self.attributes.iter().position(|a| a.name == name) {
            Some(index) => {
                let attribute = &mut self.attributes[index];
                if attribute.domain != domain || attribute.data_type() != data_type {
                    attribute.domain = domain;
                    attribute.values = AttributeArray::new(data_type, domain_size);
                }
                index
            }
            None => {
                self.attributes.push(Attribute {
                    name: name.to_owned(),
                    domain,
                    values: AttributeArray::new(data_type, domain_size),
                });
                self.attributes.len() - 1
            }
        };
        &mut self.attributes[index].values
    }

    /// Visit every attribute until the callback returns `false`.
    /// Returns `false` if the iteration was stopped early.
    pub fn for_all(&self, mut callback: impl FnMut(&str, AttributeMeta) -> bool) -> bool {
        self.attributes.iter().all(|a| callback(&a.name, a.meta()))
    }

    /// Resize every column stored on `domain`, filling new elements with defaults.
    pub fn resize_domain(&mut self, domain: AttrDomain, len: usize) {
        for attribute in self.attributes.iter_mut().filter(|a| a.domain == domain) {
            attribute.values.resize(len);
        }
    }

    /// Replace every column stored on `domain` with `values[indices[i]]`.
    pub fn gather_domain(&mut self, domain: AttrDomain, indices: &[usize]) {
        for attribute in self.attributes.iter_mut().filter(|a| a.domain == domain) {
            attribute.values = attribute.values.gather(indices);
        }
    }
}

/// Anything that stores attributes on one or more domains.
pub trait AttributeOwner: Send + Sync {
    fn attributes(&self) -> &AttributeMap;

    fn attributes_for_write(&mut self) -> &mut AttributeMap;

    /// Number of elements in a domain. Zero for domains the owner doesn't have.
    fn attribute_domain_size(&self, domain: AttrDomain) -> usize;

    /// For each element of `to`, the element of `from` whose value it takes.
    /// `None` when values can't be moved between these domains.
    fn domain_gather_indices(&self, _from: AttrDomain, _to: AttrDomain) -> Option<Vec<usize>> {
        None
    }

    /// Read an attribute as `data_type` on `domain`.
    ///
    /// Missing attributes, and attributes that can't be adapted to `domain`, read as
    /// default values.
    fn lookup_or_default(&self, name: &str, domain: AttrDomain, data_type: AttrType) -> AttributeArray {
        let domain_size = self.attribute_domain_size(domain);
        let Some(attribute) = self.attributes().lookup(name) else {
            return AttributeArray::new(data_type, domain_size);
        };
        if attribute.domain() == domain {
            return attribute.values().convert(data_type);
        }
        match self.domain_gather_indices(attribute.domain(), domain) {
            Some(indices) => attribute.values().gather(&indices).convert(data_type),
            None => {
                log::trace!(
                    "attribute '{}' can't be adapted from {:?} to {:?}, using defaults",
                    name,
                    attribute.domain(),
                    domain
                );
                AttributeArray::new(data_type, domain_size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lookup_remove() {
        let mut map = AttributeMap::new();
        assert!(map.add("weight", AttrDomain::Point, vec![1.0_f32, 2.0]));
        assert!(!map.add("weight", AttrDomain::Point, vec![3.0_f32]));
        assert_eq!(map.lookup_typed::<f32>("weight"), Some(&[1.0, 2.0][..]));
        assert_eq!(map.lookup_typed::<i32>("weight"), None);
        assert!(map.remove("weight").is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn write_only_span_replaces_mismatched_columns() {
        let mut map = AttributeMap::new();
        map.add("a", AttrDomain::Point, vec![1_i32, 2]);
        let values = map.lookup_or_add_for_write_only_span("a", AttrDomain::Point, AttrType::Float, 3);
        assert_eq!(values.len(), 3);
        assert_eq!(map.lookup("a").unwrap().data_type(), AttrType::Float);
    }

    #[test]
    fn domain_resize_and_gather_only_touch_that_domain() {
        let mut map = AttributeMap::new();
        map.add("p", AttrDomain::Point, vec![1_i32, 2, 3]);
        map.add("f", AttrDomain::Face, vec![7_i32]);
        map.gather_domain(AttrDomain::Point, &[2, 0]);
        map.resize_domain(AttrDomain::Face, 2);
        assert_eq!(map.lookup_typed::<i32>("p"), Some(&[3, 1][..]));
        assert_eq!(map.lookup_typed::<i32>("f"), Some(&[7, 0][..]));
    }

    #[test]
    fn for_all_stops_early() {
        let mut map = AttributeMap::new();
        map.add("a", AttrDomain::Point, vec![1_i32]);
        map.add("b", AttrDomain::Point, vec![1_i32]);
        let mut seen = Vec::new();
        let finished = map.for_all(|name, _| {
            seen.push(name.to_owned());
            false
        });
        assert!(!finished);
        assert_eq!(seen, vec!["a".to_owned()]);
    }
}
