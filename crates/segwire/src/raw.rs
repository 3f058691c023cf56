//! Raw output view
//!
//! Interprets the opaque byte buffers produced by the inference engine as
//! typed arrays. Buffers are read in native byte order. Aligned buffers are
//! borrowed in place; misaligned ones (common when a host runtime hands over
//! a byte pointer into a larger arena) are decoded into an owned copy.

use std::borrow::Cow;
use std::mem::size_of;

use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::OutputNames;
use crate::error::DecodeError;
use crate::types::BoundingBox;

/// Columns per detection row in the box output: x1, y1, x2, y2, score
pub const BOX_COLUMNS: usize = 5;

/// Element type of a raw output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ElementType {
    F32 = 0,
    I64 = 1,
    I32 = 2,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::I64 => 8,
        }
    }

    /// Map a C enum code (0=F32, 1=I64, 2=I32)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::F32),
            1 => Some(Self::I64),
            2 => Some(Self::I32),
            _ => None,
        }
    }
}

/// One named model output: bytes plus shape metadata
#[derive(Debug, Clone)]
pub struct RawTensor<'a> {
    name: String,
    element_type: ElementType,
    shape: Vec<usize>,
    data: Cow<'a, [u8]>,
}

impl<'a> RawTensor<'a> {
    /// Wrap a caller-owned buffer without copying
    pub fn borrowed(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<usize>,
        data: &'a [u8],
    ) -> Self {
        Self {
            name: name.into(),
            element_type,
            shape,
            data: Cow::Borrowed(data),
        }
    }

    pub fn owned(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> RawTensor<'static> {
        RawTensor {
            name: name.into(),
            element_type,
            shape,
            data: Cow::Owned(data),
        }
    }

    pub fn from_f32(name: impl Into<String>, shape: Vec<usize>, values: &[f32]) -> RawTensor<'static> {
        RawTensor::owned(name, ElementType::F32, shape, values.as_bytes().to_vec())
    }

    pub fn from_i64(name: impl Into<String>, shape: Vec<usize>, values: &[i64]) -> RawTensor<'static> {
        RawTensor::owned(name, ElementType::I64, shape, values.as_bytes().to_vec())
    }

    pub fn from_i32(name: impl Into<String>, shape: Vec<usize>, values: &[i32]) -> RawTensor<'static> {
        RawTensor::owned(name, ElementType::I32, shape, values.as_bytes().to_vec())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of elements implied by the shape, `None` on overflow
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    fn shape_overflow(&self) -> DecodeError {
        DecodeError::ShapeMismatch {
            name: self.name.clone(),
            reason: format!("shape {:?} overflows the addressable size", self.shape),
        }
    }

    fn require_rank(&self, min: usize) -> Result<(), DecodeError> {
        if self.shape.len() < min {
            return Err(DecodeError::RankTooLow {
                name: self.name.clone(),
                min,
                found: self.shape.len(),
            });
        }
        Ok(())
    }

    /// Typed view over the whole declared shape
    fn typed<T>(&self) -> Result<Cow<'_, [T]>, DecodeError>
    where
        T: FromBytes + Immutable + KnownLayout + Clone,
    {
        let expected = self
            .element_count()
            .and_then(|n| n.checked_mul(size_of::<T>()))
            .ok_or_else(|| self.shape_overflow())?;
        if self.data.len() < expected {
            return Err(DecodeError::BufferTooShort {
                name: self.name.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(cast_slice(&self.data[..expected]))
    }

    fn unexpected_type(&self, expected: &'static str) -> DecodeError {
        DecodeError::UnexpectedType {
            name: self.name.clone(),
            expected,
            found: self.element_type,
        }
    }
}

fn cast_slice<T>(bytes: &[u8]) -> Cow<'_, [T]>
where
    T: FromBytes + Immutable + KnownLayout + Clone,
{
    match <[T]>::ref_from_bytes(bytes) {
        Ok(values) => Cow::Borrowed(values),
        Err(_) => Cow::Owned(
            bytes
                .chunks_exact(size_of::<T>())
                .filter_map(|chunk| T::read_from_bytes(chunk).ok())
                .collect(),
        ),
    }
}

/// All outputs of one inference call
#[derive(Debug, Clone, Default)]
pub struct RawOutputs<'a> {
    tensors: Vec<RawTensor<'a>>,
}

impl<'a> RawOutputs<'a> {
    pub fn new(tensors: Vec<RawTensor<'a>>) -> Self {
        Self { tensors }
    }

    pub fn push(&mut self, tensor: RawTensor<'a>) {
        self.tensors.push(tensor);
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RawTensor<'a>> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Look up by name, falling back to an unnamed tensor at `position`
    fn resolve(&self, name: &str, position: usize) -> Result<&RawTensor<'a>, DecodeError> {
        self.get(name)
            .or_else(|| self.tensors.get(position).filter(|t| t.name.is_empty()))
            .ok_or_else(|| DecodeError::MissingOutput(name.to_string()))
    }
}

/// How mask slots relate to detections, resolved once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskLayout {
    /// One mask per detection, `[1, N, H, W]` or `[N, H, W]`
    PerDetection { count: usize },
    /// A single mask broadcast to every detection
    Shared,
}

/// Typed view over the mask output
#[derive(Debug, Clone)]
pub struct MaskView<'t> {
    layout: MaskLayout,
    side: usize,
    data: Cow<'t, [f32]>,
}

impl<'t> MaskView<'t> {
    fn from_tensor(tensor: &'t RawTensor<'_>) -> Result<Self, DecodeError> {
        if tensor.element_type != ElementType::F32 {
            return Err(tensor.unexpected_type("f32"));
        }
        tensor.require_rank(2)?;

        let shape = tensor.shape();
        let (count, height, width) = match *shape {
            [_, n, h, w] => (n, h, w),
            [n, h, w] => (n, h, w),
            [h, w] => (1, h, w),
            _ => {
                return Err(DecodeError::ShapeMismatch {
                    name: tensor.name.clone(),
                    reason: format!("expected rank 2-4, got {:?}", shape),
                })
            }
        };
        if height != width || height == 0 {
            return Err(DecodeError::ShapeMismatch {
                name: tensor.name.clone(),
                reason: format!("masks must be square and non-empty, got {}x{}", height, width),
            });
        }

        let data = tensor.typed::<f32>()?;
        let required = count
            .checked_mul(height)
            .and_then(|n| n.checked_mul(width))
            .ok_or_else(|| tensor.shape_overflow())?;
        if data.len() < required {
            return Err(DecodeError::ShapeMismatch {
                name: tensor.name.clone(),
                reason: format!("{} masks of {}x{} exceed buffer", count, height, width),
            });
        }

        let layout = if count == 1 {
            MaskLayout::Shared
        } else {
            MaskLayout::PerDetection { count }
        };

        Ok(Self {
            layout,
            side: height,
            data,
        })
    }

    pub fn layout(&self) -> MaskLayout {
        self.layout
    }

    /// Mask side length in pixels
    pub fn side(&self) -> usize {
        self.side
    }

    /// Element offset of the mask used by detection `index`
    pub fn offset_for(&self, index: usize) -> Option<usize> {
        let slot = match self.layout {
            MaskLayout::Shared => 0,
            MaskLayout::PerDetection { count: 0 } => return None,
            MaskLayout::PerDetection { count } => index.min(count - 1),
        };
        Some(slot * self.side * self.side)
    }

    /// The `side * side` mask starting at `offset`
    pub fn slice_at(&self, offset: usize) -> &[f32] {
        let len = self.side * self.side;
        self.data.get(offset..offset + len).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
enum ClassIds<'t> {
    I64(Cow<'t, [i64]>),
    I32(Cow<'t, [i32]>),
}

/// Typed views over the three outputs of one frame
#[derive(Debug, Clone)]
pub struct RawOutputSet<'t> {
    detection_count: usize,
    class_ids: ClassIds<'t>,
    boxes: Cow<'t, [f32]>,
    box_stride: usize,
    masks: Option<MaskView<'t>>,
}

impl<'t> RawOutputSet<'t> {
    /// Resolve and validate the outputs needed by the decoder.
    ///
    /// Masks are only looked up when `with_masks` is set.
    pub fn from_outputs(
        outputs: &'t RawOutputs<'_>,
        names: &OutputNames,
        with_masks: bool,
    ) -> Result<Self, DecodeError> {
        let labels = outputs.resolve(&names.labels, 0)?;
        labels.require_rank(2)?;
        let detection_count = labels.shape()[1];

        let class_ids = match labels.element_type() {
            ElementType::I64 => ClassIds::I64(labels.typed()?),
            ElementType::I32 => ClassIds::I32(labels.typed()?),
            ElementType::F32 => return Err(labels.unexpected_type("i64 or i32")),
        };
        let available = match &class_ids {
            ClassIds::I64(ids) => ids.len(),
            ClassIds::I32(ids) => ids.len(),
        };
        if available < detection_count {
            return Err(DecodeError::ShapeMismatch {
                name: labels.name.clone(),
                reason: format!("{} ids for {} detections", available, detection_count),
            });
        }

        let boxes_tensor = outputs.resolve(&names.boxes, 1)?;
        if boxes_tensor.element_type() != ElementType::F32 {
            return Err(boxes_tensor.unexpected_type("f32"));
        }
        boxes_tensor.require_rank(3)?;
        let shape = boxes_tensor.shape();
        let box_stride = shape[2];
        if shape[1] < detection_count || box_stride < BOX_COLUMNS {
            return Err(DecodeError::ShapeMismatch {
                name: boxes_tensor.name.clone(),
                reason: format!(
                    "shape {:?} cannot hold {} rows of {} columns",
                    shape, detection_count, BOX_COLUMNS
                ),
            });
        }
        let boxes = boxes_tensor.typed::<f32>()?;
        let required = detection_count
            .checked_mul(box_stride)
            .ok_or_else(|| boxes_tensor.shape_overflow())?;
        if boxes.len() < required {
            return Err(DecodeError::ShapeMismatch {
                name: boxes_tensor.name.clone(),
                reason: "empty batch dimension".to_string(),
            });
        }

        let masks = if with_masks {
            let view = MaskView::from_tensor(outputs.resolve(&names.masks, 2)?)?;
            debug!(
                layout = ?view.layout(),
                side = view.side(),
                "resolved mask output"
            );
            Some(view)
        } else {
            None
        };

        Ok(Self {
            detection_count,
            class_ids,
            boxes,
            box_stride,
            masks,
        })
    }

    pub fn detection_count(&self) -> usize {
        self.detection_count
    }

    pub fn class_id(&self, index: usize) -> i64 {
        match &self.class_ids {
            ClassIds::I64(ids) => ids[index],
            ClassIds::I32(ids) => i64::from(ids[index]),
        }
    }

    fn row(&self, index: usize) -> &[f32] {
        let start = index * self.box_stride;
        &self.boxes[start..start + BOX_COLUMNS]
    }

    pub fn score(&self, index: usize) -> f32 {
        self.row(index)[4]
    }

    pub fn bbox(&self, index: usize) -> BoundingBox {
        let row = self.row(index);
        BoundingBox::new(row[0], row[1], row[2], row[3])
    }

    pub fn masks(&self) -> Option<&MaskView<'t>> {
        self.masks.as_ref()
    }
}
