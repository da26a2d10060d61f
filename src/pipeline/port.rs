//! Port addressing and port buffers.
//!
//! A port is addressed by a structured [`PortKey`] (base name + pyramid level),
//! compared by value. The textual form (`RAW_L0`, `EDGES_LC0`) exists for logs,
//! saved-file folders and manifests only; lookups never go through strings.
//!
//! Jobs declare their outputs with [`OutputSpec`]s and their inputs with
//! [`PortRef`]s (key + wave offset).

use crate::pipeline::error::{ConfigResult, JobError};
use crate::pipeline::level::{FrameGeometry, PyramidLevel};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical port identity: `(base name, level)`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortKey {
    pub name: String,
    pub level: PyramidLevel,
}

impl PortKey {
    pub fn new(name: impl Into<String>, level: PyramidLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// Reference to this port `wave_offset` waves in the past.
    pub fn at(&self, wave_offset: u32) -> PortRef {
        PortRef {
            key: self.clone(),
            wave_offset,
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.level)
    }
}

impl fmt::Debug for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortKey({})", self)
    }
}

impl FromStr for PortKey {
    type Err = String;

    /// Parses the display form. The level is the suffix after the last `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, level) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("'{}' has no level suffix", s))?;
        if name.is_empty() {
            return Err(format!("'{}' has an empty port name", s));
        }
        Ok(PortKey::new(name, level.parse()?))
    }
}

impl TryFrom<String> for PortKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortKey> for String {
    fn from(key: PortKey) -> Self {
        key.to_string()
    }
}

/// Deepest history a job may ask for. Each port keeps `offset + 1` buffers.
pub const MAX_WAVE_OFFSET: u32 = 256;

/// Input address: a port plus how many waves back to read it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub key: PortKey,
    pub wave_offset: u32,
}

impl PortRef {
    pub fn new(name: impl Into<String>, level: PyramidLevel, wave_offset: u32) -> Self {
        Self {
            key: PortKey::new(name, level),
            wave_offset,
        }
    }

    pub fn is_same_wave(&self) -> bool {
        self.wave_offset == 0
    }
}

/// Element type of a port buffer. Serialized as its one-letter tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "B")]
    U8,
    #[serde(rename = "H")]
    U16,
    #[serde(rename = "h")]
    I16,
    #[serde(rename = "I")]
    U32,
    #[serde(rename = "i")]
    I32,
    #[serde(rename = "f")]
    F32,
    #[serde(rename = "d")]
    F64,
}

impl DType {
    pub fn tag(self) -> char {
        match self {
            DType::U8 => 'B',
            DType::U16 => 'H',
            DType::I16 => 'h',
            DType::U32 => 'I',
            DType::I32 => 'i',
            DType::F32 => 'f',
            DType::F64 => 'd',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Some(match tag {
            'B' => DType::U8,
            'H' => DType::U16,
            'h' => DType::I16,
            'I' => DType::U32,
            'i' => DType::I32,
            'f' => DType::F32,
            'd' => DType::F64,
            _ => return None,
        })
    }
}

/// Shape of an output as a function of its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeExpr {
    /// `[h, w]`, or `[h, w, 3]` for color ports, at the port's level.
    Image,
    /// Level-independent shape, e.g. a `(n, 7)` keypoint table.
    Fixed(Vec<usize>),
}

impl ShapeExpr {
    pub fn resolve(
        &self,
        level: PyramidLevel,
        color: bool,
        geometry: &FrameGeometry,
    ) -> ConfigResult<Vec<usize>> {
        match self {
            ShapeExpr::Image => {
                let (h, w) = geometry.dims(level)?;
                Ok(if color { vec![h, w, 3] } else { vec![h, w] })
            }
            ShapeExpr::Fixed(dims) => Ok(dims.clone()),
        }
    }
}

/// Output declaration: `(name, shape expression, dtype tag, color flag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub key: PortKey,
    pub shape: ShapeExpr,
    pub dtype: DType,
    pub color: bool,
}

impl OutputSpec {
    pub fn image(key: PortKey, dtype: DType, color: bool) -> Self {
        Self {
            key,
            shape: ShapeExpr::Image,
            dtype,
            color,
        }
    }

    pub fn fixed(key: PortKey, dims: Vec<usize>, dtype: DType) -> Self {
        Self {
            key,
            shape: ShapeExpr::Fixed(dims),
            dtype,
            color: false,
        }
    }
}

/// Owned n-dimensional buffer, one variant per dtype.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PortBuffer {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! buffer_accessors {
    ($($variant:ident => $ty:ty, $get:ident, $get_mut:ident;)*) => {
        impl PortBuffer {
            $(
                pub fn $get(&self) -> Option<&ArrayD<$ty>> {
                    match self {
                        PortBuffer::$variant(a) => Some(a),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut ArrayD<$ty>> {
                    match self {
                        PortBuffer::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<ArrayD<$ty>> for PortBuffer {
                fn from(array: ArrayD<$ty>) -> Self {
                    PortBuffer::$variant(array)
                }
            }
        )*
    };
}

buffer_accessors! {
    U8 => u8, as_u8, as_u8_mut;
    U16 => u16, as_u16, as_u16_mut;
    I16 => i16, as_i16, as_i16_mut;
    U32 => u32, as_u32, as_u32_mut;
    I32 => i32, as_i32, as_i32_mut;
    F32 => f32, as_f32, as_f32_mut;
    F64 => f64, as_f64, as_f64_mut;
}

/// Applies `$body` to the inner array of any variant.
macro_rules! with_array {
    ($buffer:expr, $a:ident => $body:expr) => {
        match $buffer {
            PortBuffer::U8($a) => $body,
            PortBuffer::U16($a) => $body,
            PortBuffer::I16($a) => $body,
            PortBuffer::U32($a) => $body,
            PortBuffer::I32($a) => $body,
            PortBuffer::F32($a) => $body,
            PortBuffer::F64($a) => $body,
        }
    };
}

impl PortBuffer {
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match dtype {
            DType::U8 => PortBuffer::U8(ArrayD::zeros(dim)),
            DType::U16 => PortBuffer::U16(ArrayD::zeros(dim)),
            DType::I16 => PortBuffer::I16(ArrayD::zeros(dim)),
            DType::U32 => PortBuffer::U32(ArrayD::zeros(dim)),
            DType::I32 => PortBuffer::I32(ArrayD::zeros(dim)),
            DType::F32 => PortBuffer::F32(ArrayD::zeros(dim)),
            DType::F64 => PortBuffer::F64(ArrayD::zeros(dim)),
        }
    }

    /// Zero-sized placeholder left behind while a buffer is checked out.
    pub(crate) fn empty() -> Self {
        PortBuffer::U8(ArrayD::zeros(IxDyn(&[0])))
    }

    pub fn dtype(&self) -> DType {
        match self {
            PortBuffer::U8(_) => DType::U8,
            PortBuffer::U16(_) => DType::U16,
            PortBuffer::I16(_) => DType::I16,
            PortBuffer::U32(_) => DType::U32,
            PortBuffer::I32(_) => DType::I32,
            PortBuffer::F32(_) => DType::F32,
            PortBuffer::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fill_zero(&mut self) {
        with_array!(self, a => a.fill(Default::default()))
    }

    /// Copy `src` into `self` in place. Dtype and shape must match exactly;
    /// the allocation of `self` is kept.
    pub fn copy_from(&mut self, key: &PortKey, src: &PortBuffer) -> Result<(), JobError> {
        if self.shape() != src.shape() {
            return Err(JobError::BufferMismatch {
                key: key.clone(),
                message: format!("shape {:?} vs source {:?}", self.shape(), src.shape()),
            });
        }
        match (self, src) {
            (PortBuffer::U8(d), PortBuffer::U8(s)) => d.assign(s),
            (PortBuffer::U16(d), PortBuffer::U16(s)) => d.assign(s),
            (PortBuffer::I16(d), PortBuffer::I16(s)) => d.assign(s),
            (PortBuffer::U32(d), PortBuffer::U32(s)) => d.assign(s),
            (PortBuffer::I32(d), PortBuffer::I32(s)) => d.assign(s),
            (PortBuffer::F32(d), PortBuffer::F32(s)) => d.assign(s),
            (PortBuffer::F64(d), PortBuffer::F64(s)) => d.assign(s),
            (d, s) => {
                return Err(JobError::BufferMismatch {
                    key: key.clone(),
                    message: format!("dtype {:?} vs source {:?}", d.dtype(), s.dtype()),
                })
            }
        }
        Ok(())
    }

    /// Like [`copy_from`](Self::copy_from), but elements where `mask` is zero
    /// are written as zero.
    pub fn copy_masked(
        &mut self,
        key: &PortKey,
        src: &PortBuffer,
        mask: &ArrayD<u8>,
    ) -> Result<(), JobError> {
        if mask.shape() != src.shape() {
            return Err(JobError::BufferMismatch {
                key: key.clone(),
                message: format!("mask shape {:?} vs source {:?}", mask.shape(), src.shape()),
            });
        }
        self.copy_from(key, src)?;
        with_array!(self, a => {
            ndarray::Zip::from(a).and(mask).for_each(|v, &m| {
                if m == 0 {
                    *v = Default::default();
                }
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_key_display_round_trip() {
        let key = PortKey::new("SIFT_KP_RAW", PyramidLevel::LC0);
        assert_eq!(key.to_string(), "SIFT_KP_RAW_LC0");
        assert_eq!("SIFT_KP_RAW_LC0".parse::<PortKey>(), Ok(key));
        assert!("RAW".parse::<PortKey>().is_err());
        assert!("_L0".parse::<PortKey>().is_err());
    }

    #[test]
    fn test_keys_compare_by_value_not_prefix() {
        // "A_L1" + "0" style concatenation collisions cannot happen.
        let a = PortKey::new("A", PyramidLevel::Level(1));
        let b = PortKey::new("A_L1", PyramidLevel::L0);
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_dtype_tags() {
        for dtype in [
            DType::U8,
            DType::U16,
            DType::I16,
            DType::U32,
            DType::I32,
            DType::F32,
            DType::F64,
        ] {
            assert_eq!(DType::from_tag(dtype.tag()), Some(dtype));
        }
        assert_eq!(DType::from_tag('x'), None);
        assert_eq!(serde_json::to_string(&DType::U8).unwrap(), "\"B\"");
    }

    #[test]
    fn test_shape_expr_resolves_per_level() {
        let geometry = FrameGeometry::new(64, 32);
        assert_eq!(
            ShapeExpr::Image.resolve(PyramidLevel::L1, true, &geometry),
            Ok(vec![16, 32, 3])
        );
        assert_eq!(
            ShapeExpr::Image.resolve(PyramidLevel::L0, false, &geometry),
            Ok(vec![32, 64])
        );
        assert_eq!(
            ShapeExpr::Fixed(vec![512, 7]).resolve(PyramidLevel::Level(4), false, &geometry),
            Ok(vec![512, 7])
        );
    }

    #[test]
    fn test_copy_from_checks_dtype_and_shape() {
        let key = PortKey::new("X", PyramidLevel::L0);
        let mut dst = PortBuffer::zeros(DType::U8, &[2, 2]);
        let src = PortBuffer::from(ArrayD::from_elem(IxDyn(&[2, 2]), 7u8));
        dst.copy_from(&key, &src).unwrap();
        assert_eq!(dst, src);

        let wrong_type = PortBuffer::zeros(DType::F32, &[2, 2]);
        assert!(dst.copy_from(&key, &wrong_type).is_err());
        let wrong_shape = PortBuffer::zeros(DType::U8, &[3, 2]);
        assert!(dst.copy_from(&key, &wrong_shape).is_err());
    }

    #[test]
    fn test_copy_masked_zeroes_outside_mask() {
        let key = PortKey::new("X", PyramidLevel::L0);
        let src = PortBuffer::from(ArrayD::from_elem(IxDyn(&[1, 3]), 5i32));
        let mask = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![1u8, 0, 255]).unwrap();
        let mut dst = PortBuffer::zeros(DType::I32, &[1, 3]);
        dst.copy_masked(&key, &src, &mask).unwrap();
        assert_eq!(dst.as_i32().unwrap().as_slice().unwrap(), &[5, 0, 5]);
    }
}
