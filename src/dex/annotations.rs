//! DEX annotations-related structures and I/O
//!
//! The on-disk form links items together through file offsets:
//! - annotations_directory_item
//! - annotation_set_item
//! - annotation_set_ref_list
//! - annotation_item (wraps EncodedAnnotation)
//!
//! [`AnnotationsDirectory`] is the resolved form kept in the container model; the
//! writer lays the offsets out again.

use crate::dex::encoded_values::EncodedAnnotation;
use crate::dex::error::DexError;
use crate::dex::{read_u1, read_u4, write_u1, write_u4};

pub const VISIBILITY_BUILD: u8 = 0x00;
pub const VISIBILITY_RUNTIME: u8 = 0x01;
pub const VISIBILITY_SYSTEM: u8 = 0x02;

/// annotation_item
/// https://source.android.com/docs/core/runtime/dex-format#annotation-item
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    /// Visibility: 0x00 = build, 0x01 = runtime, 0x02 = system
    pub visibility: u8,
    /// The encoded annotation payload
    pub annotation: EncodedAnnotation,
}

impl AnnotationItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationItem, DexError> {
        let visibility = read_u1(bytes, ix)?;
        let annotation = EncodedAnnotation::read(bytes, ix)?;
        Ok(AnnotationItem {
            visibility,
            annotation,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u1(bytes, self.visibility);
        c += self.annotation.write(bytes);
        c
    }
}

/// A resolved annotation_set_item: the annotations themselves rather than their offsets.
pub type AnnotationSet = Vec<AnnotationItem>;

/// annotation_set_item
/// https://source.android.com/docs/core/runtime/dex-format#annotation-set-item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetItem {
    /// Offsets (from start of the file) to `annotation_item`s
    pub entries: Vec<u32>,
}

impl AnnotationSetItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetItem, DexError> {
        let size = read_u4(bytes, ix)? as usize;
        let mut entries = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            entries.push(read_u4(bytes, ix)?);
        }
        Ok(AnnotationSetItem { entries })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.entries.len() as u32);
        for off in &self.entries {
            c += write_u4(bytes, *off);
        }
        c
    }

    /// Follows every entry offset; a zero entry is skipped.
    pub fn resolve(bytes: &[u8], off: u32) -> Result<AnnotationSet, DexError> {
        let mut ix = off as usize;
        let set = AnnotationSetItem::read(bytes, &mut ix)?;
        let mut items = Vec::with_capacity(set.entries.len());
        for entry_off in set.entries {
            if entry_off == 0 {
                continue;
            }
            let mut j = entry_off as usize;
            let item = AnnotationItem::read(bytes, &mut j)
                .map_err(|e| DexError::with_context(e, format!("annotation_item at 0x{:x}", entry_off)))?;
            items.push(item);
        }
        Ok(items)
    }
}

/// annotation_set_ref_list
/// A list of offsets to `annotation_set_item`s
/// https://source.android.com/docs/core/runtime/dex-format#annotation-set-ref-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetRefList {
    pub list: Vec<u32>,
}

impl AnnotationSetRefList {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetRefList, DexError> {
        let size = read_u4(bytes, ix)? as usize;
        let mut list = Vec::with_capacity(size.min(256));
        for _ in 0..size {
            list.push(read_u4(bytes, ix)?);
        }
        Ok(AnnotationSetRefList { list })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.list.len() as u32);
        for off in &self.list {
            c += write_u4(bytes, *off);
        }
        c
    }
}

/// Annotations of one field, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAnnotations {
    /// index into field_ids
    pub field_idx: u32,
    pub annotations: AnnotationSet,
}

/// Annotations of one method, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodAnnotations {
    /// index into method_ids
    pub method_idx: u32,
    pub annotations: AnnotationSet,
}

/// Per-parameter annotations of one method. A `None` slot had a zero offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAnnotations {
    /// index into method_ids (method whose parameters are being annotated)
    pub method_idx: u32,
    pub parameters: Vec<Option<AnnotationSet>>,
}

/// annotations_directory_item, resolved
/// https://source.android.com/docs/core/runtime/dex-format#annotations-directory-item
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationsDirectory {
    /// The class annotations, `None` when `class_annotations_off` was zero
    pub class_annotations: Option<AnnotationSet>,
    pub field_annotations: Vec<FieldAnnotations>,
    pub method_annotations: Vec<MethodAnnotations>,
    pub parameter_annotations: Vec<ParameterAnnotations>,
}

impl AnnotationsDirectory {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationsDirectory, DexError> {
        let class_annotations_off = read_u4(bytes, ix)?;
        let fields_size = read_u4(bytes, ix)? as usize;
        let annotated_methods_size = read_u4(bytes, ix)? as usize;
        let annotated_parameters_size = read_u4(bytes, ix)? as usize;

        let class_annotations = if class_annotations_off != 0 {
            Some(AnnotationSetItem::resolve(bytes, class_annotations_off)?)
        } else {
            None
        };

        let mut field_annotations = Vec::with_capacity(fields_size.min(1024));
        for _ in 0..fields_size {
            let field_idx = read_u4(bytes, ix)?;
            let annotations_off = read_u4(bytes, ix)?;
            field_annotations.push(FieldAnnotations {
                field_idx,
                annotations: AnnotationSetItem::resolve(bytes, annotations_off)?,
            });
        }

        let mut method_annotations = Vec::with_capacity(annotated_methods_size.min(1024));
        for _ in 0..annotated_methods_size {
            let method_idx = read_u4(bytes, ix)?;
            let annotations_off = read_u4(bytes, ix)?;
            method_annotations.push(MethodAnnotations {
                method_idx,
                annotations: AnnotationSetItem::resolve(bytes, annotations_off)?,
            });
        }

        let mut parameter_annotations = Vec::with_capacity(annotated_parameters_size.min(1024));
        for _ in 0..annotated_parameters_size {
            let method_idx = read_u4(bytes, ix)?;
            let mut list_ix = read_u4(bytes, ix)? as usize;
            let ref_list = AnnotationSetRefList::read(bytes, &mut list_ix)?;
            let mut parameters = Vec::with_capacity(ref_list.list.len());
            for set_off in ref_list.list {
                if set_off == 0 {
                    parameters.push(None);
                } else {
                    parameters.push(Some(AnnotationSetItem::resolve(bytes, set_off)?));
                }
            }
            parameter_annotations.push(ParameterAnnotations { method_idx, parameters });
        }

        Ok(AnnotationsDirectory {
            class_annotations,
            field_annotations,
            method_annotations,
            parameter_annotations,
        })
    }

    /// A directory with nothing in it is written as a zero offset.
    pub fn is_empty(&self) -> bool {
        self.class_annotations.is_none()
            && self.field_annotations.is_empty()
            && self.method_annotations.is_empty()
            && self.parameter_annotations.is_empty()
    }
}
