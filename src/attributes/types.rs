/// The granularity an attribute is stored at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrDomain {
    Point,
    Edge,
    Face,
    Corner,
    Curve,
    Instance,
    Layer,
}

impl AttrDomain {
    /// Rank used when two inputs store the same attribute on different domains.
    /// The higher rank wins.
    fn priority(self) -> u8 {
        match self {
            AttrDomain::Instance => 0,
            AttrDomain::Layer => 1,
            AttrDomain::Curve => 2,
            AttrDomain::Face => 3,
            AttrDomain::Edge => 4,
            AttrDomain::Point => 5,
            AttrDomain::Corner => 6,
        }
    }

    /// The domain of the two with the highest priority.
    pub fn highest_priority(self, other: AttrDomain) -> AttrDomain {
        if other.priority() > self.priority() { other } else { self }
    }
}

/// The value type stored per element.
///
/// Declaration order is the complexity order: converting "up" the list never loses
/// information that the joined result could represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrType {
    String,
    Bool,
    Int8,
    Int32,
    Float,
    Float2,
    Float3,
    ColorFloat,
    Float4x4,
}

impl AttrType {
    /// The more complex type of the two.
    pub fn highest_complexity(self, other: AttrType) -> AttrType {
        self.max(other)
    }
}

/// Domain and type of one attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeMeta {
    pub domain: AttrDomain,
    pub data_type: AttrType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_picks_the_most_general() {
        assert_eq!(AttrType::Float.highest_complexity(AttrType::Float3), AttrType::Float3);
        assert_eq!(AttrType::Float3.highest_complexity(AttrType::Int32), AttrType::Float3);
        assert_eq!(AttrType::Bool.highest_complexity(AttrType::ColorFloat), AttrType::ColorFloat);
        assert_eq!(AttrDomain::Point.highest_priority(AttrDomain::Face), AttrDomain::Point);
        assert_eq!(AttrDomain::Point.highest_priority(AttrDomain::Corner), AttrDomain::Corner);
        assert_eq!(AttrDomain::Instance.highest_priority(AttrDomain::Curve), AttrDomain::Curve);
    }
}
