//! Encodes a [`ClassContainer`] as a dex file.
//!
//! The id sections are copied from the shared pools unchanged, so instruction
//! operands and annotation values stay valid. Only the data section is laid
//! out again, for the classes that the container holds. Because the id
//! section sizes are known up front, every data offset is absolute from the
//! moment it is written.

use crate::dex::annotations::{AnnotationSet, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectory};
use crate::dex::container::{
    ClassContainer, CodeItem, FieldDefinition, Header, IdPools, MethodDefinition, TypeList, ENDIAN_CONSTANT,
    HEADER_SIZE, TYPE_CALL_SITE_ID_ITEM, TYPE_METHOD_HANDLE_ITEM,
};
use crate::dex::encoded_values::write_encoded_array;
use crate::dex::error::DexError;
use crate::dex::{patch_u4, write_u2, write_u4, write_uleb128, write_x};
use adler::adler32_slice;
use log::trace;
use sha1::{Digest, Sha1};

use std::collections::HashMap;

const TYPE_HEADER_ITEM: u16 = 0x0000;
const TYPE_STRING_ID_ITEM: u16 = 0x0001;
const TYPE_TYPE_ID_ITEM: u16 = 0x0002;
const TYPE_PROTO_ID_ITEM: u16 = 0x0003;
const TYPE_FIELD_ID_ITEM: u16 = 0x0004;
const TYPE_METHOD_ID_ITEM: u16 = 0x0005;
const TYPE_CLASS_DEF_ITEM: u16 = 0x0006;
const TYPE_MAP_LIST: u16 = 0x1000;
const TYPE_TYPE_LIST: u16 = 0x1001;
const TYPE_ANNOTATION_SET_REF_LIST: u16 = 0x1002;
const TYPE_ANNOTATION_SET_ITEM: u16 = 0x1003;
const TYPE_CLASS_DATA_ITEM: u16 = 0x2000;
const TYPE_CODE_ITEM: u16 = 0x2001;
const TYPE_STRING_DATA_ITEM: u16 = 0x2002;
const TYPE_DEBUG_INFO_ITEM: u16 = 0x2003;
const TYPE_ANNOTATION_ITEM: u16 = 0x2004;
const TYPE_ENCODED_ARRAY_ITEM: u16 = 0x2005;
const TYPE_ANNOTATIONS_DIRECTORY_ITEM: u16 = 0x2006;

const CLASS_DEF_ITEM_SIZE: u32 = 0x20;

#[derive(Debug, Clone, Copy)]
struct MapItem {
    type_code: u16,
    size: u32,
    offset: u32,
}

impl MapItem {
    fn new(type_code: u16, size: u32, offset: u32) -> Self {
        MapItem { type_code, size, offset }
    }
}

/// Offsets of the id sections, which only depend on the pool sizes.
struct SectionOffsets {
    string_ids: u32,
    type_ids: u32,
    proto_ids: u32,
    field_ids: u32,
    method_ids: u32,
    class_defs: u32,
    call_site_ids: u32,
    method_handles: u32,
    data_off: u32,
}

impl SectionOffsets {
    fn compute(pools: &IdPools, class_count: usize) -> SectionOffsets {
        let string_ids = HEADER_SIZE;
        let type_ids = string_ids + pools.strings.len() as u32 * 4;
        let proto_ids = type_ids + pools.types.len() as u32 * 4;
        let field_ids = proto_ids + pools.prototypes.len() as u32 * 12;
        let method_ids = field_ids + pools.fields.len() as u32 * 8;
        let class_defs = method_ids + pools.methods.len() as u32 * 8;
        let call_site_ids = class_defs + class_count as u32 * CLASS_DEF_ITEM_SIZE;
        let method_handles = call_site_ids + pools.call_sites.len() as u32 * 4;
        let data_off = method_handles + pools.method_handles.len() as u32 * 8;
        SectionOffsets {
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
            call_site_ids,
            method_handles,
            data_off,
        }
    }
}

/// The data section under construction. Items of one kind are written
/// contiguously, which is what the map list needs.
struct DataSection {
    base: u32,
    bytes: Vec<u8>,
    items: Vec<MapItem>,
}

impl DataSection {
    fn new(base: u32) -> DataSection {
        DataSection { base, bytes: vec![], items: vec![] }
    }

    fn position(&self) -> u32 {
        self.base + self.bytes.len() as u32
    }

    fn align(&mut self, alignment: u32) {
        let target = align_to(self.position(), alignment);
        while self.position() < target {
            self.bytes.push(0);
        }
    }

    /// Starts a new item of `type_code`, returning its absolute offset.
    fn begin(&mut self, type_code: u16, alignment: u32) -> u32 {
        self.align(alignment);
        let offset = self.position();
        match self.items.last_mut() {
            Some(item) if item.type_code == type_code => item.size += 1,
            _ => self.items.push(MapItem::new(type_code, 1, offset)),
        }
        offset
    }
}

#[derive(Default)]
struct ClassOffsets {
    interfaces_off: u32,
    annotations_off: u32,
    class_data_off: u32,
    static_values_off: u32,
}

/// Offsets of the annotation items of one directory, mirroring its shape.
#[derive(Default)]
struct DirectoryItems {
    class_set: Option<Vec<u32>>,
    field_sets: Vec<Vec<u32>>,
    method_sets: Vec<Vec<u32>>,
    parameter_sets: Vec<Vec<Option<Vec<u32>>>>,
}

pub(crate) fn write_container(container: &ClassContainer) -> Result<Vec<u8>, DexError> {
    let pools = container.pools();
    let classes = container.classes();
    let sections = SectionOffsets::compute(pools, classes.len());
    let mut data = DataSection::new(sections.data_off);
    let mut class_offsets: Vec<ClassOffsets> = classes.iter().map(|_| ClassOffsets::default()).collect();

    let mut string_data_offsets = Vec::with_capacity(pools.strings.len());
    for s in &pools.strings {
        string_data_offsets.push(data.begin(TYPE_STRING_DATA_ITEM, 1));
        s.write(&mut data.bytes);
    }

    // Type lists are shared between protos and classes with the same contents
    let mut type_lists: HashMap<&[u32], u32> = HashMap::new();
    let mut proto_parameter_offsets = Vec::with_capacity(pools.prototypes.len());
    for proto in &pools.prototypes {
        proto_parameter_offsets.push(write_type_list(&mut data, &mut type_lists, &proto.parameters));
    }
    for (class, offsets) in classes.iter().zip(class_offsets.iter_mut()) {
        offsets.interfaces_off = write_type_list(&mut data, &mut type_lists, &class.interfaces);
    }

    let mut call_site_offsets = Vec::with_capacity(pools.call_sites.len());
    for call_site in &pools.call_sites {
        call_site_offsets.push(data.begin(TYPE_ENCODED_ARRAY_ITEM, 1));
        write_encoded_array(call_site, &mut data.bytes);
    }
    for (class, offsets) in classes.iter().zip(class_offsets.iter_mut()) {
        if !class.static_values.is_empty() {
            offsets.static_values_off = data.begin(TYPE_ENCODED_ARRAY_ITEM, 1);
            write_encoded_array(&class.static_values, &mut data.bytes);
        }
    }

    let directories: Vec<Option<DirectoryItems>> = classes
        .iter()
        .map(|class| {
            if class.annotations.is_empty() { None } else { Some(write_annotation_items(&mut data, &class.annotations)) }
        })
        .collect();
    let set_offsets: Vec<Option<DirectoryItems>> = directories
        .iter()
        .map(|items| items.as_ref().map(|items| write_annotation_sets(&mut data, items)))
        .collect();
    let ref_list_offsets: Vec<Option<Vec<u32>>> = set_offsets
        .iter()
        .map(|sets| sets.as_ref().map(|sets| write_ref_lists(&mut data, sets)))
        .collect();
    for (i, class) in classes.iter().enumerate() {
        if let (Some(sets), Some(ref_lists)) = (&set_offsets[i], &ref_list_offsets[i]) {
            class_offsets[i].annotations_off = write_directory(&mut data, &class.annotations, sets, ref_lists);
        }
    }

    let mut debug_info_offsets: Vec<Vec<u32>> = Vec::with_capacity(classes.len());
    for class in classes {
        let mut offsets = vec![];
        for method in class.methods() {
            match method.code.as_ref().and_then(|c| c.debug_info.as_ref()) {
                Some(debug_info) => {
                    offsets.push(data.begin(TYPE_DEBUG_INFO_ITEM, 1));
                    write_x(&mut data.bytes, debug_info);
                }
                None => offsets.push(0),
            }
        }
        debug_info_offsets.push(offsets);
    }

    let mut code_offsets: Vec<Vec<u32>> = Vec::with_capacity(classes.len());
    for (class, debug_offsets) in classes.iter().zip(debug_info_offsets.iter()) {
        let mut offsets = vec![];
        for (method, debug_info_off) in class.methods().zip(debug_offsets.iter()) {
            match &method.code {
                Some(code) => {
                    offsets.push(data.begin(TYPE_CODE_ITEM, 4));
                    write_code_item(&mut data.bytes, code, *debug_info_off)?;
                }
                None => offsets.push(0),
            }
        }
        code_offsets.push(offsets);
    }

    for ((class, offsets), code_offsets) in classes.iter().zip(class_offsets.iter_mut()).zip(code_offsets.iter()) {
        if class.has_class_data() {
            offsets.class_data_off = data.begin(TYPE_CLASS_DATA_ITEM, 1);
            write_class_data(
                &mut data.bytes,
                &class.static_fields,
                &class.instance_fields,
                &class.direct_methods,
                &class.virtual_methods,
                code_offsets,
            )
            .map_err(|e| DexError::with_context(e, format!("class data of {}", class.descriptor)))?;
        }
    }

    let map_off = data.begin(TYPE_MAP_LIST, 4);
    let map_items = build_map_items(pools, classes.len(), &sections, &data.items);
    write_map_list(&mut data.bytes, &map_items);

    let mut file = Vec::with_capacity((sections.data_off as usize) + data.bytes.len());
    file.resize(HEADER_SIZE as usize, 0);

    for off in &string_data_offsets {
        write_u4(&mut file, *off);
    }
    for sid in &pools.types {
        write_u4(&mut file, *sid);
    }
    for (proto, parameters_off) in pools.prototypes.iter().zip(proto_parameter_offsets.iter()) {
        write_u4(&mut file, proto.shorty_idx);
        write_u4(&mut file, proto.return_type_idx);
        write_u4(&mut file, *parameters_off);
    }
    for field in &pools.fields {
        field.write(&mut file);
    }
    for method in &pools.methods {
        method.write(&mut file);
    }
    for (class, offsets) in classes.iter().zip(class_offsets.iter()) {
        write_u4(&mut file, class.class_idx);
        write_u4(&mut file, class.access_flags.bits());
        write_u4(&mut file, class.superclass_idx);
        write_u4(&mut file, offsets.interfaces_off);
        write_u4(&mut file, class.source_file_idx);
        write_u4(&mut file, offsets.annotations_off);
        write_u4(&mut file, offsets.class_data_off);
        write_u4(&mut file, offsets.static_values_off);
    }
    for off in &call_site_offsets {
        write_u4(&mut file, *off);
    }
    for handle in &pools.method_handles {
        handle.write(&mut file);
    }
    if file.len() != sections.data_off as usize {
        fail!("id sections end at 0x{:x}, expected 0x{:x}", file.len(), sections.data_off);
    }
    file.extend_from_slice(&data.bytes);

    let mut header = Header {
        magic: container.magic(),
        checksum: 0,
        signature: [0; 20],
        file_size: file.len() as u32,
        header_size: HEADER_SIZE,
        endian_tag: ENDIAN_CONSTANT,
        link_size: 0,
        link_off: 0,
        map_off,
        string_ids_size: pools.strings.len() as u32,
        string_ids_off: section_off(pools.strings.len(), sections.string_ids),
        type_ids_size: pools.types.len() as u32,
        type_ids_off: section_off(pools.types.len(), sections.type_ids),
        proto_ids_size: pools.prototypes.len() as u32,
        proto_ids_off: section_off(pools.prototypes.len(), sections.proto_ids),
        field_ids_size: pools.fields.len() as u32,
        field_ids_off: section_off(pools.fields.len(), sections.field_ids),
        method_ids_size: pools.methods.len() as u32,
        method_ids_off: section_off(pools.methods.len(), sections.method_ids),
        class_defs_size: classes.len() as u32,
        class_defs_off: section_off(classes.len(), sections.class_defs),
        data_size: data.bytes.len() as u32,
        data_off: sections.data_off,
    };

    overwrite_header(&mut file, &header);
    header.signature = compute_sha1(&file[32..]);
    overwrite_header(&mut file, &header);
    let checksum = adler32_slice(&file[12..]);
    patch_u4(&mut file, 8, checksum);

    trace!("encoded {} classes into {} bytes", classes.len(), file.len());
    Ok(file)
}

fn section_off(count: usize, offset: u32) -> u32 {
    if count == 0 { 0 } else { offset }
}

fn write_type_list<'a>(data: &mut DataSection, written: &mut HashMap<&'a [u32], u32>, types: &'a [u32]) -> u32 {
    if types.is_empty() {
        return 0;
    }
    if let Some(off) = written.get(types) {
        return *off;
    }
    let off = data.begin(TYPE_TYPE_LIST, 4);
    TypeList(types.to_vec()).write(&mut data.bytes);
    written.insert(types, off);
    off
}

fn write_annotation_set_items(data: &mut DataSection, set: &AnnotationSet) -> Vec<u32> {
    set.iter()
        .map(|item| {
            let off = data.begin(TYPE_ANNOTATION_ITEM, 1);
            item.write(&mut data.bytes);
            off
        })
        .collect()
}

fn write_annotation_items(data: &mut DataSection, directory: &AnnotationsDirectory) -> DirectoryItems {
    DirectoryItems {
        class_set: directory.class_annotations.as_ref().map(|set| write_annotation_set_items(data, set)),
        field_sets: directory
            .field_annotations
            .iter()
            .map(|f| write_annotation_set_items(data, &f.annotations))
            .collect(),
        method_sets: directory
            .method_annotations
            .iter()
            .map(|m| write_annotation_set_items(data, &m.annotations))
            .collect(),
        parameter_sets: directory
            .parameter_annotations
            .iter()
            .map(|p| {
                p.parameters
                    .iter()
                    .map(|set| set.as_ref().map(|set| write_annotation_set_items(data, set)))
                    .collect()
            })
            .collect(),
    }
}

fn write_set(data: &mut DataSection, entries: &[u32]) -> u32 {
    let off = data.begin(TYPE_ANNOTATION_SET_ITEM, 4);
    AnnotationSetItem { entries: entries.to_vec() }.write(&mut data.bytes);
    off
}

/// Writes the annotation_set_items, returning the same shape holding one set offset each.
fn write_annotation_sets(data: &mut DataSection, items: &DirectoryItems) -> DirectoryItems {
    DirectoryItems {
        class_set: items.class_set.as_ref().map(|entries| vec![write_set(data, entries)]),
        field_sets: items.field_sets.iter().map(|entries| vec![write_set(data, entries)]).collect(),
        method_sets: items.method_sets.iter().map(|entries| vec![write_set(data, entries)]).collect(),
        parameter_sets: items
            .parameter_sets
            .iter()
            .map(|params| {
                params
                    .iter()
                    .map(|entries| entries.as_ref().map(|entries| vec![write_set(data, entries)]))
                    .collect()
            })
            .collect(),
    }
}

fn write_ref_lists(data: &mut DataSection, sets: &DirectoryItems) -> Vec<u32> {
    sets.parameter_sets
        .iter()
        .map(|params| {
            let list = params
                .iter()
                .map(|set| set.as_ref().and_then(|s| s.first().copied()).unwrap_or(0))
                .collect();
            let off = data.begin(TYPE_ANNOTATION_SET_REF_LIST, 4);
            AnnotationSetRefList { list }.write(&mut data.bytes);
            off
        })
        .collect()
}

fn first_offset(set: &[u32]) -> u32 {
    set.first().copied().unwrap_or(0)
}

fn write_directory(
    data: &mut DataSection,
    directory: &AnnotationsDirectory,
    sets: &DirectoryItems,
    ref_lists: &[u32],
) -> u32 {
    let off = data.begin(TYPE_ANNOTATIONS_DIRECTORY_ITEM, 4);
    let bytes = &mut data.bytes;
    write_u4(bytes, sets.class_set.as_deref().map(first_offset).unwrap_or(0));
    write_u4(bytes, directory.field_annotations.len() as u32);
    write_u4(bytes, directory.method_annotations.len() as u32);
    write_u4(bytes, directory.parameter_annotations.len() as u32);
    for (field, set) in directory.field_annotations.iter().zip(sets.field_sets.iter()) {
        write_u4(bytes, field.field_idx);
        write_u4(bytes, first_offset(set));
    }
    for (method, set) in directory.method_annotations.iter().zip(sets.method_sets.iter()) {
        write_u4(bytes, method.method_idx);
        write_u4(bytes, first_offset(set));
    }
    for (parameters, list_off) in directory.parameter_annotations.iter().zip(ref_lists.iter()) {
        write_u4(bytes, parameters.method_idx);
        write_u4(bytes, *list_off);
    }
    off
}

fn write_code_item(bytes: &mut Vec<u8>, code: &CodeItem, debug_info_off: u32) -> Result<(), DexError> {
    if code.tries.len() > u16::MAX as usize {
        fail!("too many try items: {}", code.tries.len());
    }
    write_u2(bytes, code.registers_size);
    write_u2(bytes, code.ins_size);
    write_u2(bytes, code.outs_size);
    write_u2(bytes, code.tries.len() as u16);
    write_u4(bytes, debug_info_off);
    write_u4(bytes, code.insns.len() as u32);
    for insn in &code.insns {
        write_u2(bytes, *insn);
    }
    if !code.tries.is_empty() {
        if code.insns.len() % 2 == 1 {
            write_u2(bytes, 0);
        }
        for t in &code.tries {
            t.write(bytes);
        }
        write_x(bytes, &code.handlers);
    }
    Ok(())
}

fn index_diff(previous: Option<u32>, idx: u32) -> Result<u32, DexError> {
    match previous {
        None => Ok(idx),
        Some(prev) if idx > prev => Ok(idx - prev),
        Some(prev) => fail!("member indices out of order ({} after {})", idx, prev),
    }
}

fn write_encoded_fields(bytes: &mut Vec<u8>, fields: &[FieldDefinition]) -> Result<(), DexError> {
    let mut previous = None;
    for f in fields {
        write_uleb128(bytes, index_diff(previous, f.field_idx)?);
        write_uleb128(bytes, f.access_flags.bits());
        previous = Some(f.field_idx);
    }
    Ok(())
}

fn write_encoded_methods(bytes: &mut Vec<u8>, methods: &[MethodDefinition], code_offsets: &[u32]) -> Result<(), DexError> {
    let mut previous = None;
    for (m, code_off) in methods.iter().zip(code_offsets.iter()) {
        write_uleb128(bytes, index_diff(previous, m.method_idx)?);
        write_uleb128(bytes, m.access_flags.bits());
        write_uleb128(bytes, *code_off);
        previous = Some(m.method_idx);
    }
    Ok(())
}

fn write_class_data(
    bytes: &mut Vec<u8>,
    static_fields: &[FieldDefinition],
    instance_fields: &[FieldDefinition],
    direct_methods: &[MethodDefinition],
    virtual_methods: &[MethodDefinition],
    code_offsets: &[u32],
) -> Result<(), DexError> {
    write_uleb128(bytes, static_fields.len() as u32);
    write_uleb128(bytes, instance_fields.len() as u32);
    write_uleb128(bytes, direct_methods.len() as u32);
    write_uleb128(bytes, virtual_methods.len() as u32);
    write_encoded_fields(bytes, static_fields)?;
    write_encoded_fields(bytes, instance_fields)?;
    let (direct_offsets, virtual_offsets) = code_offsets.split_at(direct_methods.len().min(code_offsets.len()));
    write_encoded_methods(bytes, direct_methods, direct_offsets)?;
    write_encoded_methods(bytes, virtual_methods, virtual_offsets)?;
    Ok(())
}

fn build_map_items(pools: &IdPools, class_count: usize, sections: &SectionOffsets, data_items: &[MapItem]) -> Vec<MapItem> {
    let mut items = vec![MapItem::new(TYPE_HEADER_ITEM, 1, 0)];
    let ids = [
        (TYPE_STRING_ID_ITEM, pools.strings.len(), sections.string_ids),
        (TYPE_TYPE_ID_ITEM, pools.types.len(), sections.type_ids),
        (TYPE_PROTO_ID_ITEM, pools.prototypes.len(), sections.proto_ids),
        (TYPE_FIELD_ID_ITEM, pools.fields.len(), sections.field_ids),
        (TYPE_METHOD_ID_ITEM, pools.methods.len(), sections.method_ids),
        (TYPE_CLASS_DEF_ITEM, class_count, sections.class_defs),
        (TYPE_CALL_SITE_ID_ITEM, pools.call_sites.len(), sections.call_site_ids),
        (TYPE_METHOD_HANDLE_ITEM, pools.method_handles.len(), sections.method_handles),
    ];
    for (type_code, count, offset) in ids {
        if count > 0 {
            items.push(MapItem::new(type_code, count as u32, offset));
        }
    }
    items.extend_from_slice(data_items);
    items.sort_by_key(|item| item.offset);
    items
}

fn write_map_list(bytes: &mut Vec<u8>, entries: &[MapItem]) {
    write_u4(bytes, entries.len() as u32);
    for item in entries {
        write_u2(bytes, item.type_code);
        write_u2(bytes, 0);
        write_u4(bytes, item.size);
        write_u4(bytes, item.offset);
    }
}

fn overwrite_header(buf: &mut [u8], header: &Header) {
    let mut header_bytes = Vec::with_capacity(HEADER_SIZE as usize);
    header.write(&mut header_bytes);
    buf[..HEADER_SIZE as usize].copy_from_slice(&header_bytes);
}

fn compute_sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

fn align_to(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::container::{read_class_names, NO_INDEX};
    use crate::tests::fixtures::{DexFixture, FixtureClass};

    fn map_types(bytes: &[u8]) -> Vec<(u16, u32, u32)> {
        let mut ix = 0;
        let header = Header::read(bytes, &mut ix).unwrap();
        let mut ix = header.map_off as usize;
        let size = crate::dex::read_u4(bytes, &mut ix).unwrap();
        (0..size)
            .map(|_| {
                let t = crate::dex::read_u2(bytes, &mut ix).unwrap();
                crate::dex::read_u2(bytes, &mut ix).unwrap();
                let n = crate::dex::read_u4(bytes, &mut ix).unwrap();
                let off = crate::dex::read_u4(bytes, &mut ix).unwrap();
                (t, n, off)
            })
            .collect()
    }

    #[test]
    fn checksum_and_signature_cover_the_file() {
        let bytes = DexFixture::new().class(FixtureClass::new("Lfoo/Bar;").method("run", 0x1)).to_bytes();
        let mut ix = 0;
        let header = Header::read(&bytes, &mut ix).unwrap();
        assert_eq!(header.checksum, adler32_slice(&bytes[12..]));
        assert_eq!(header.signature, compute_sha1(&bytes[32..]));
        assert_eq!(header.file_size as usize, bytes.len());
        assert_eq!((header.data_off + header.data_size) as usize, bytes.len());
        assert_eq!(header.data_size % 4, 0);
    }

    #[test]
    fn map_list_is_sorted_and_starts_with_the_header() {
        let bytes = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").method("run", 0x1).inner_class("Bar", 0x11))
            .class(FixtureClass::new("Lfoo/Baz;"))
            .to_bytes();
        let map = map_types(&bytes);
        assert_eq!(map[0], (TYPE_HEADER_ITEM, 1, 0));
        assert!(map.windows(2).all(|w| w[0].2 < w[1].2));
        assert_eq!(map.last().map(|m| m.0), Some(TYPE_MAP_LIST));
        let types: Vec<u16> = map.iter().map(|m| m.0).collect();
        for t in [TYPE_CLASS_DEF_ITEM, TYPE_CODE_ITEM, TYPE_CLASS_DATA_ITEM, TYPE_ANNOTATION_ITEM, TYPE_ANNOTATIONS_DIRECTORY_ITEM] {
            assert!(types.contains(&t), "missing map item 0x{:04x}", t);
        }
    }

    #[test]
    fn subsets_keep_the_pools_and_drop_other_classes() {
        let container = DexFixture::new()
            .class(FixtureClass::new("La/A;").method("a", 0x1))
            .class(FixtureClass::new("La/B;").method("b", 0x1))
            .build();
        let subset = container.select(["La/B;"]);
        let bytes = subset.to_bytes().unwrap();
        assert_eq!(read_class_names(&bytes).unwrap(), vec!["a.B"]);

        let decoded = ClassContainer::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.pools().as_ref(), container.pools().as_ref());
        assert_eq!(decoded.classes(), subset.classes());
    }

    #[test]
    fn empty_containers_still_encode() {
        let container = DexFixture::new().build().select([]);
        let bytes = container.to_bytes().unwrap();
        let decoded = ClassContainer::from_bytes(&bytes).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.magic(), container.magic());
    }

    #[test]
    fn out_of_order_members_are_rejected() {
        let mut container = DexFixture::new()
            .class(FixtureClass::new("La/A;").method("a", 0x1).method("b", 0x1))
            .build();
        let mut classes = container.classes().to_vec();
        classes[0].virtual_methods.reverse();
        container = container.with_classes(classes);
        assert!(container.to_bytes().is_err());
    }

    #[test]
    fn no_index_superclass_is_kept() {
        let container = DexFixture::new().class(FixtureClass::new("La/A;").no_superclass()).build();
        let decoded = ClassContainer::from_bytes(&container.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.classes()[0].superclass_idx, NO_INDEX);
    }
}
