use cgmath::{Matrix4, SquareMatrix, Vector2, Vector3, Vector4, Zero};

use crate::attributes::types::AttrType;

/// A single attribute element of any supported type.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int8(i8),
    Int32(i32),
    Float(f32),
    Float2(Vector2<f32>),
    Float3(Vector3<f32>),
    ColorFloat(Vector4<f32>),
    Float4x4(Matrix4<f32>),
}

/// One typed attribute column.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeArray {
    String(Vec<String>),
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int32(Vec<i32>),
    Float(Vec<f32>),
    Float2(Vec<Vector2<f32>>),
    Float3(Vec<Vector3<f32>>),
    ColorFloat(Vec<Vector4<f32>>),
    Float4x4(Vec<Matrix4<f32>>),
}

/// Runs `$body` with `$values` bound to the inner `Vec` of whatever variant `$array` is.
macro_rules! with_values {
    ($array:expr, $values:ident => $body:expr) => {
        match $array {
            AttributeArray::String($values) => $body,
            AttributeArray::Bool($values) => $body,
            AttributeArray::Int8($values) => $body,
            AttributeArray::Int32($values) => $body,
            AttributeArray::Float($values) => $body,
            AttributeArray::Float2($values) => $body,
            AttributeArray::Float3($values) => $body,
            AttributeArray::ColorFloat($values) => $body,
            AttributeArray::Float4x4($values) => $body,
        }
    };
}

/// Rust types that can be stored in an [`AttributeArray`].
pub trait AttributeElement: Clone + Send + Sync + 'static {
    const DATA_TYPE: AttrType;

    fn default_value() -> Self;
    fn from_value(value: AttributeValue) -> Self;
    fn into_value(self) -> AttributeValue;
    fn slice(array: &AttributeArray) -> Option<&[Self]>;
    fn slice_mut(array: &mut AttributeArray) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> AttributeArray;
}

macro_rules! impl_attribute_element {
    ($ty:ty, $variant:ident, $default:expr) => {
        impl AttributeElement for $ty {
            const DATA_TYPE: AttrType = AttrType::$variant;

            fn default_value() -> Self {
                $default
            }

            fn from_value(value: AttributeValue) -> Self {
                match value.convert(AttrType::$variant) {
                    AttributeValue::$variant(v) => v,
                    _ => unreachable!("conversion always yields the requested type"),
                }
            }

            fn into_value(self) -> AttributeValue {
                AttributeValue::$variant(self)
            }

            fn slice(array: &AttributeArray) -> Option<&[Self]> {
                match array {
                    AttributeArray::$variant(values) => Some(values.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(array: &mut AttributeArray) -> Option<&mut [Self]> {
                match array {
                    AttributeArray::$variant(values) => Some(values.as_mut_slice()),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> AttributeArray {
                AttributeArray::$variant(values)
            }
        }
    };
}

impl_attribute_element!(String, String, String::new());
impl_attribute_element!(bool, Bool, false);
impl_attribute_element!(i8, Int8, 0);
impl_attribute_element!(i32, Int32, 0);
impl_attribute_element!(f32, Float, 0.0);
impl_attribute_element!(Vector2<f32>, Float2, Vector2::zero());
impl_attribute_element!(Vector3<f32>, Float3, Vector3::zero());
impl_attribute_element!(Vector4<f32>, ColorFloat, Vector4::zero());
impl_attribute_element!(Matrix4<f32>, Float4x4, Matrix4::identity());

impl AttributeValue {
    /// The default value of a type, used to fill elements that have no source.
    pub fn default_for(data_type: AttrType) -> Self {
        match data_type {
            AttrType::String => String::default_value().into_value(),
            AttrType::Bool => bool::default_value().into_value(),
            AttrType::Int8 => i8::default_value().into_value(),
            AttrType::Int32 => i32::default_value().into_value(),
            AttrType::Float => f32::default_value().into_value(),
            AttrType::Float2 => Vector2::<f32>::default_value().into_value(),
            AttrType::Float3 => Vector3::<f32>::default_value().into_value(),
            AttrType::ColorFloat => Vector4::<f32>::default_value().into_value(),
            AttrType::Float4x4 => Matrix4::<f32>::default_value().into_value(),
        }
    }

    pub fn data_type(&self) -> AttrType {
        match self {
            AttributeValue::String(_) => AttrType::String,
            AttributeValue::Bool(_) => AttrType::Bool,
            AttributeValue::Int8(_) => AttrType::Int8,
            AttributeValue::Int32(_) => AttrType::Int32,
            AttributeValue::Float(_) => AttrType::Float,
            AttributeValue::Float2(_) => AttrType::Float2,
            AttributeValue::Float3(_) => AttrType::Float3,
            AttributeValue::ColorFloat(_) => AttrType::ColorFloat,
            AttributeValue::Float4x4(_) => AttrType::Float4x4,
        }
    }

    fn to_float(&self) -> f32 {
        match self {
            AttributeValue::String(_) | AttributeValue::Float4x4(_) => 0.0,
            AttributeValue::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            AttributeValue::Int8(v) => *v as f32,
            AttributeValue::Int32(v) => *v as f32,
            AttributeValue::Float(v) => *v,
            AttributeValue::Float2(v) => (v.x + v.y) / 2.0,
            AttributeValue::Float3(v) => (v.x + v.y + v.z) / 3.0,
            // luminance
            AttributeValue::ColorFloat(v) => v.x * 0.2126 + v.y * 0.7152 + v.z * 0.0722,
        }
    }

    fn to_float3(&self) -> Vector3<f32> {
        match self {
            AttributeValue::Float2(v) => Vector3::new(v.x, v.y, 0.0),
            AttributeValue::Float3(v) => *v,
            AttributeValue::ColorFloat(v) => v.truncate(),
            AttributeValue::Float4x4(m) => m.w.truncate(),
            scalar => {
                let f = scalar.to_float();
                Vector3::new(f, f, f)
            }
        }
    }

    fn to_color(&self) -> Vector4<f32> {
        match self {
            AttributeValue::ColorFloat(v) => *v,
            AttributeValue::Float2(v) => Vector4::new(v.x, v.y, 0.0, 1.0),
            other => other.to_float3().extend(1.0),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            AttributeValue::Bool(v) => *v,
            AttributeValue::String(s) => !s.is_empty(),
            AttributeValue::Int8(v) => *v != 0,
            AttributeValue::Int32(v) => *v != 0,
            AttributeValue::Float(v) => *v != 0.0,
            AttributeValue::Float2(v) => !v.is_zero(),
            AttributeValue::Float3(v) => !v.is_zero(),
            AttributeValue::ColorFloat(v) => !v.is_zero(),
            AttributeValue::Float4x4(m) => *m != Matrix4::identity(),
        }
    }

    fn to_int(&self) -> i32 {
        match self {
            AttributeValue::Int8(v) => *v as i32,
            AttributeValue::Int32(v) => *v,
            other => other.to_float() as i32,
        }
    }

    /// Convert to another type. Every pair of types has a conversion.
    pub fn convert(&self, to: AttrType) -> AttributeValue {
        if self.data_type() == to {
            return self.clone();
        }
        match to {
            AttrType::String => AttributeValue::String(String::new()),
            AttrType::Bool => AttributeValue::Bool(self.to_bool()),
            AttrType::Int8 => {
                AttributeValue::Int8(self.to_int().clamp(i8::MIN as i32, i8::MAX as i32) as i8)
            }
            AttrType::Int32 => AttributeValue::Int32(self.to_int()),
            AttrType::Float => AttributeValue::Float(self.to_float()),
            AttrType::Float2 => AttributeValue::Float2(self.to_float3().truncate()),
            AttrType::Float3 => AttributeValue::Float3(self.to_float3()),
            AttrType::ColorFloat => AttributeValue::ColorFloat(self.to_color()),
            AttrType::Float4x4 => match self {
                AttributeValue::Float3(v) => AttributeValue::Float4x4(Matrix4::from_translation(*v)),
                _ => AttributeValue::Float4x4(Matrix4::identity()),
            },
        }
    }
}

impl AttributeArray {
    /// A column of `len` default values.
    pub fn new(data_type: AttrType, len: usize) -> Self {
        Self::filled(&AttributeValue::default_for(data_type), len)
    }

    /// A column of `len` copies of `value`.
    pub fn filled(value: &AttributeValue, len: usize) -> Self {
        match value {
            AttributeValue::String(v) => AttributeArray::String(vec![v.clone(); len]),
            AttributeValue::Bool(v) => AttributeArray::Bool(vec![*v; len]),
            AttributeValue::Int8(v) => AttributeArray::Int8(vec![*v; len]),
            AttributeValue::Int32(v) => AttributeArray::Int32(vec![*v; len]),
            AttributeValue::Float(v) => AttributeArray::Float(vec![*v; len]),
            AttributeValue::Float2(v) => AttributeArray::Float2(vec![*v; len]),
            AttributeValue::Float3(v) => AttributeArray::Float3(vec![*v; len]),
            AttributeValue::ColorFloat(v) => AttributeArray::ColorFloat(vec![*v; len]),
            AttributeValue::Float4x4(v) => AttributeArray::Float4x4(vec![*v; len]),
        }
    }

    pub fn data_type(&self) -> AttrType {
        match self {
            AttributeArray::String(_) => AttrType::String,
            AttributeArray::Bool(_) => AttrType::Bool,
            AttributeArray::Int8(_) => AttrType::Int8,
            AttributeArray::Int32(_) => AttrType::Int32,
            AttributeArray::Float(_) => AttrType::Float,
            AttributeArray::Float2(_) => AttrType::Float2,
            AttributeArray::Float3(_) => AttrType::Float3,
            AttributeArray::ColorFloat(_) => AttrType::ColorFloat,
            AttributeArray::Float4x4(_) => AttrType::Float4x4,
        }
    }

    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the element at `index`.
    pub fn get(&self, index: usize) -> AttributeValue {
        with_values!(self, values => values[index].clone().into_value())
    }

    /// Set the element at `index`, converting the value to the column's type.
    pub fn set(&mut self, index: usize, value: &AttributeValue) {
        with_values!(self, values => values[index] = AttributeElement::from_value(value.clone()))
    }

    /// Grow (with default values) or truncate to `len` elements.
    pub fn resize(&mut self, len: usize) {
        with_values!(self, values => values.resize(len, AttributeElement::default_value()))
    }

    /// A new column with `values[indices[i]]` at position `i`.
    pub fn gather(&self, indices: &[usize]) -> AttributeArray {
        with_values!(self, values => AttributeElement::wrap(
            indices.iter().map(|&i| values[i].clone()).collect::<Vec<_>>()
        ))
    }

    /// Copy of this column stored as `to`.
    pub fn convert(&self, to: AttrType) -> AttributeArray {
        if self.data_type() == to {
            return self.clone();
        }
        let mut result = AttributeArray::new(to, self.len());
        for i in 0..self.len() {
            result.set(i, &self.get(i));
        }
        result
    }

    /// Overwrite `src.len()` elements starting at `offset` with `src` (converted if needed).
    pub fn copy_from_at(&mut self, offset: usize, src: &AttributeArray) {
        debug_assert!(offset + src.len() <= self.len());
        let src = src.convert(self.data_type());
        match (self, &src) {
            (AttributeArray::String(dst), AttributeArray::String(src)) => {
                dst[offset..offset + src.len()].clone_from_slice(src)
            }
            (AttributeArray::Bool(dst), AttributeArray::Bool(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Int8(dst), AttributeArray::Int8(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Int32(dst), AttributeArray::Int32(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Float(dst), AttributeArray::Float(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Float2(dst), AttributeArray::Float2(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Float3(dst), AttributeArray::Float3(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::ColorFloat(dst), AttributeArray::ColorFloat(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            (AttributeArray::Float4x4(dst), AttributeArray::Float4x4(src)) => {
                dst[offset..offset + src.len()].copy_from_slice(src)
            }
            _ => unreachable!("source was converted to the destination type"),
        }
    }

    /// Fill `len` elements starting at `offset` with `value`.
    pub fn fill_at(&mut self, offset: usize, len: usize, value: &AttributeValue) {
        self.copy_from_at(offset, &AttributeArray::filled(value, len));
    }

    /// Append all of `other`, converting it if needed.
    pub fn extend_from(&mut self, other: &AttributeArray) {
        let offset = self.len();
        self.resize(offset + other.len());
        self.copy_from_at(offset, other);
    }

    /// Typed view, `None` if the column stores another type.
    pub fn typed<T: AttributeElement>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    /// Typed mutable view, `None` if the column stores another type.
    pub fn typed_mut<T: AttributeElement>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(self)
    }
}

impl<T: AttributeElement> From<Vec<T>> for AttributeArray {
    fn from(values: Vec<T>) -> Self {
        T::wrap(values)
    }
}
