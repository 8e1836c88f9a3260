/* Dex file format structures */

use crate::dex::annotations::{AnnotationItem, AnnotationsDirectory};
use crate::dex::encoded_values::{read_encoded_array, EncodedValue};
use crate::dex::error::DexError;
use crate::dex::{read_sleb128, read_u1, read_u2, read_u4, read_uleb128, read_x, write_u1, write_u2, write_u4, write_uleb128, write_x};
use crate::types::{AccessFlags, ObjectIdentifier};
use cesu8::{from_java_cesu8, to_java_cesu8};
use log::{debug, warn};

use std::collections::HashSet;
use std::sync::Arc;

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 8] = [ 0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x35, 0x00 ];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const NO_INDEX: u32 = 0xffffffff;
pub const HEADER_SIZE: u32 = 0x70;

pub(crate) const TYPE_CALL_SITE_ID_ITEM: u16 = 0x0007;
pub(crate) const TYPE_METHOD_HANDLE_ITEM: u16 = 0x0008;

pub const INNER_CLASS_ANNOTATION: &str = "Ldalvik/annotation/InnerClass;";

/* debug_info_item opcodes */
const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_START_LOCAL: u8 = 0x03;
const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
const DBG_END_LOCAL: u8 = 0x05;
const DBG_RESTART_LOCAL: u8 = 0x06;
const DBG_SET_FILE: u8 = 0x09;

const CLASS_DEF_ITEM_SIZE: usize = 0x20;

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE as usize {
            fail!("Not enough bytes for header: {}", bytes.len());
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&read_x(bytes, ix, 8)?);
        if magic[0..4] != DEX_FILE_MAGIC[0..4] { fail!("Invalid magic value {:02x?}", magic); }
        let checksum = read_u4(bytes, ix)?;
        let mut signature = [0u8; 20];
        signature.copy_from_slice(&read_x(bytes, ix, 20)?);

        let header = Header {
            magic,
            checksum,
            signature,
            file_size: read_u4(bytes, ix)?,
            header_size: read_u4(bytes, ix)?,
            endian_tag: read_u4(bytes, ix)?,
            link_size: read_u4(bytes, ix)?,
            link_off: read_u4(bytes, ix)?,
            map_off: read_u4(bytes, ix)?,
            string_ids_size: read_u4(bytes, ix)?,
            string_ids_off: read_u4(bytes, ix)?,
            type_ids_size: read_u4(bytes, ix)?,
            type_ids_off: read_u4(bytes, ix)?,
            proto_ids_size: read_u4(bytes, ix)?,
            proto_ids_off: read_u4(bytes, ix)?,
            field_ids_size: read_u4(bytes, ix)?,
            field_ids_off: read_u4(bytes, ix)?,
            method_ids_size: read_u4(bytes, ix)?,
            method_ids_off: read_u4(bytes, ix)?,
            class_defs_size: read_u4(bytes, ix)?,
            class_defs_off: read_u4(bytes, ix)?,
            data_size: read_u4(bytes, ix)?,
            data_off: read_u4(bytes, ix)?,
        };

        match header.endian_tag {
            ENDIAN_CONSTANT => Ok(header),
            REVERSE_ENDIAN_CONSTANT => fail!("Byte-swapped dex files are not supported"),
            other => fail!("Invalid endian tag 0x{:08x}", other),
        }
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_x(bytes, &self.magic);
        c += write_u4(bytes, self.checksum);
        c += write_x(bytes, &self.signature);
        c += write_u4(bytes, self.file_size);
        c += write_u4(bytes, self.header_size);
        c += write_u4(bytes, self.endian_tag);
        c += write_u4(bytes, self.link_size);
        c += write_u4(bytes, self.link_off);
        c += write_u4(bytes, self.map_off);
        c += write_u4(bytes, self.string_ids_size);
        c += write_u4(bytes, self.string_ids_off);
        c += write_u4(bytes, self.type_ids_size);
        c += write_u4(bytes, self.type_ids_off);
        c += write_u4(bytes, self.proto_ids_size);
        c += write_u4(bytes, self.proto_ids_off);
        c += write_u4(bytes, self.field_ids_size);
        c += write_u4(bytes, self.field_ids_off);
        c += write_u4(bytes, self.method_ids_size);
        c += write_u4(bytes, self.method_ids_off);
        c += write_u4(bytes, self.class_defs_size);
        c += write_u4(bytes, self.class_defs_off);
        c += write_u4(bytes, self.data_size);
        c += write_u4(bytes, self.data_off);
        c
    }
}


#[derive(Debug, Eq, PartialEq, Clone)]
pub enum DexString
{
    Decoded(String),
    /// Bytes that are not valid MUTF-8, kept verbatim with their utf16 length
    Raw(u32, Vec<u8>),
}

impl DexString
{
    pub fn from_string(s: &str) -> DexString
    {
        DexString::Decoded(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str>
    {
        match self
        {
            DexString::Decoded(s) => Some(s),
            DexString::Raw(_, _) => None,
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<DexString, DexError>
    {
        let utf16_size = read_uleb128(bytes, ix)?;
        let rest = bytes.get(*ix..).unwrap_or_default();
        let len = match rest.iter().position(|b| *b == 0)
        {
            Some(len) => len,
            None => fail!("Unterminated string_data_item at index {}", *ix),
        };
        let v = &rest[..len];
        *ix += len + 1;

        Ok(match from_java_cesu8(v)
        {
            Ok(converted_str) => DexString::Decoded(converted_str.into_owned()),
            Err(_) => DexString::Raw(utf16_size, v.to_vec()),
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;

        match self
        {
            DexString::Raw(utf16_size, v) => {
                c += write_uleb128(bytes, *utf16_size);
                c += write_x(bytes, v);
            },

            DexString::Decoded(s) => {
                let encoded = to_java_cesu8(s);
                c += write_uleb128(bytes, s.encode_utf16().count() as u32);
                c += write_x(bytes, &encoded);
            }
        }
        c += write_u1(bytes, 0);
        c
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeList(pub Vec<u32>);

impl TypeList
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TypeList, DexError>
    {
        let size = read_u4(bytes, ix)? as usize;
        let mut v = Vec::with_capacity(size.min(256));
        for _ in 0..size { v.push(read_u2(bytes, ix)? as u32); }
        Ok(TypeList(v))
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_u4(bytes, self.0.len() as u32);
        for i in &self.0 { c += write_u2(bytes, *i as u16); }
        c
    }

    fn read_at(bytes: &[u8], off: u32) -> Result<Vec<u32>, DexError>
    {
        if off == 0 { return Ok(vec![]); }
        let mut ix = off as usize;
        Ok(TypeList::read(bytes, &mut ix)?.0)
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeItem {
    // The proto_id_item struct
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldItem {
    // The field_id_item struct
    pub class_idx: u32,
    pub type_idx: u32,
    pub name_idx: u32,
}

impl FieldItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<FieldItem, DexError>
    {
        Ok(FieldItem {
            class_idx: read_u2(bytes, ix)? as u32,
            type_idx: read_u2(bytes, ix)? as u32,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        write_u2(bytes, self.class_idx as u16) + write_u2(bytes, self.type_idx as u16) + write_u4(bytes, self.name_idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodItem {
    // The method_id_item struct
    pub class_idx: u32,
    pub proto_idx: u32,
    pub name_idx: u32,
}

impl MethodItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodItem, DexError>
    {
        Ok(MethodItem {
            class_idx: read_u2(bytes, ix)? as u32,
            proto_idx: read_u2(bytes, ix)? as u32,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        write_u2(bytes, self.class_idx as u16) + write_u2(bytes, self.proto_idx as u16) + write_u4(bytes, self.name_idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandleItem {
    // The method_handle_item struct
    pub handle_type: u16,
    pub field_or_method_idx: u16,
}

impl MethodHandleItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodHandleItem, DexError>
    {
        let handle_type = read_u2(bytes, ix)?;
        read_u2(bytes, ix)?;
        let field_or_method_idx = read_u2(bytes, ix)?;
        read_u2(bytes, ix)?;
        Ok(MethodHandleItem { handle_type, field_or_method_idx })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        write_u2(bytes, self.handle_type) + write_u2(bytes, 0) + write_u2(bytes, self.field_or_method_idx) + write_u2(bytes, 0)
    }
}


/// The id sections of a dex file. Instructions, annotations and class data refer
/// into these tables by index, so every container derived from the same source
/// shares one copy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdPools {
    pub strings: Vec<DexString>,
    /// string index of each type descriptor
    pub types: Vec<u32>,
    pub prototypes: Vec<PrototypeItem>,
    pub fields: Vec<FieldItem>,
    pub methods: Vec<MethodItem>,
    pub method_handles: Vec<MethodHandleItem>,
    /// the encoded array behind each call_site_id_item
    pub call_sites: Vec<Vec<EncodedValue>>,
}

impl IdPools {
    pub fn string(&self, idx: u32) -> Option<&str> {
        self.strings.get(idx as usize).and_then(DexString::as_str)
    }

    pub fn type_descriptor(&self, type_idx: u32) -> Option<&str> {
        self.types.get(type_idx as usize).and_then(|sid| self.string(*sid))
    }

    pub fn string_index(&self, value: &str) -> Option<u32> {
        self.strings.iter().position(|s| s.as_str() == Some(value)).map(|i| i as u32)
    }

    pub fn type_index(&self, descriptor: &str) -> Option<u32> {
        let sid = self.string_index(descriptor)?;
        self.types.iter().position(|t| *t == sid).map(|i| i as u32)
    }

    pub fn method_name(&self, method_idx: u32) -> Option<&str> {
        self.methods.get(method_idx as usize).and_then(|m| self.string(m.name_idx))
    }

    /// The JNI signature of a method, e.g. `(ILjava/lang/String;)V`.
    pub fn method_descriptor(&self, method_idx: u32) -> Option<String> {
        let method = self.methods.get(method_idx as usize)?;
        let proto = self.prototypes.get(method.proto_idx as usize)?;
        let mut sig = String::from("(");
        for t in &proto.parameters {
            sig.push_str(self.type_descriptor(*t)?);
        }
        sig.push(')');
        sig.push_str(self.type_descriptor(proto.return_type_idx)?);
        Some(sig)
    }

    pub fn field_name(&self, field_idx: u32) -> Option<&str> {
        self.fields.get(field_idx as usize).and_then(|f| self.string(f.name_idx))
    }

    fn read(bytes: &[u8], header: &Header) -> Result<IdPools, DexError> {
        let mut pools = IdPools::default();

        // Read the strings
        let mut ix = header.string_ids_off as usize;
        for i in 0..header.string_ids_size
        {
            let mut string_data_off = read_u4(bytes, &mut ix)? as usize;
            let ds = DexString::read(bytes, &mut string_data_off)
                .map_err(|e| DexError::with_context(e, format!("string #{}", i)))?;
            pools.strings.push(ds);
        }

        // Read the type_ids
        ix = header.type_ids_off as usize;
        for _ in 0..header.type_ids_size
        {
            let descriptor_idx = read_u4(bytes, &mut ix)?;
            if pools.string(descriptor_idx).is_none()
            {
                fail!("Invalid type descriptor index {}", descriptor_idx);
            }
            pools.types.push(descriptor_idx);
        }

        // Read the prototypes
        ix = header.proto_ids_off as usize;
        for _ in 0..header.proto_ids_size
        {
            let shorty_idx = read_u4(bytes, &mut ix)?;
            let return_type_idx = read_u4(bytes, &mut ix)?;
            let parameters_off = read_u4(bytes, &mut ix)?;
            pools.prototypes.push(PrototypeItem {
                shorty_idx,
                return_type_idx,
                parameters: TypeList::read_at(bytes, parameters_off)?,
            });
        }

        ix = header.field_ids_off as usize;
        for _ in 0..header.field_ids_size
        {
            pools.fields.push(FieldItem::read(bytes, &mut ix)?);
        }

        ix = header.method_ids_off as usize;
        for _ in 0..header.method_ids_size
        {
            pools.methods.push(MethodItem::read(bytes, &mut ix)?);
        }

        // Call sites and method handles are only listed in the map
        if header.map_off != 0
        {
            ix = header.map_off as usize;
            let size = read_u4(bytes, &mut ix)?;
            for _ in 0..size
            {
                let type_code = read_u2(bytes, &mut ix)?;
                read_u2(bytes, &mut ix)?;
                let count = read_u4(bytes, &mut ix)?;
                let mut item_ix = read_u4(bytes, &mut ix)? as usize;
                match type_code
                {
                    TYPE_CALL_SITE_ID_ITEM => {
                        for _ in 0..count {
                            let mut array_ix = read_u4(bytes, &mut item_ix)? as usize;
                            pools.call_sites.push(read_encoded_array(bytes, &mut array_ix)?);
                        }
                    }
                    TYPE_METHOD_HANDLE_ITEM => {
                        for _ in 0..count {
                            pools.method_handles.push(MethodHandleItem::read(bytes, &mut item_ix)?);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(pools)
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// offset (in bytes) into the encoded_catch_handler_list
    pub handler_off: u16,
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        write_u4(bytes, self.start_addr) + write_u2(bytes, self.insn_count) + write_u2(bytes, self.handler_off)
    }
}

/// Steps over one encoded_catch_handler.
fn skip_catch_handler(bytes: &[u8], ix: &mut usize) -> Result<(), DexError> {
    let size = read_sleb128(bytes, ix)?;
    for _ in 0..size.unsigned_abs() {
        read_uleb128(bytes, ix)?; // type_idx
        read_uleb128(bytes, ix)?; // addr
    }
    if size <= 0 {
        read_uleb128(bytes, ix)?; // catch_all_addr
    }
    Ok(())
}

/// Steps over a debug_info_item, whose length is only known by running its state machine.
fn skip_debug_info(bytes: &[u8], ix: &mut usize) -> Result<(), DexError> {
    read_uleb128(bytes, ix)?; // line_start
    let parameters_size = read_uleb128(bytes, ix)?;
    for _ in 0..parameters_size {
        read_uleb128(bytes, ix)?;
    }
    loop {
        match read_u1(bytes, ix)? {
            DBG_END_SEQUENCE => return Ok(()),
            DBG_ADVANCE_PC | DBG_END_LOCAL | DBG_RESTART_LOCAL | DBG_SET_FILE => {
                read_uleb128(bytes, ix)?;
            }
            DBG_ADVANCE_LINE => {
                read_sleb128(bytes, ix)?;
            }
            DBG_START_LOCAL => {
                for _ in 0..3 { read_uleb128(bytes, ix)?; }
            }
            DBG_START_LOCAL_EXTENDED => {
                for _ in 0..4 { read_uleb128(bytes, ix)?; }
            }
            // prologue/epilogue markers and special opcodes carry no operands
            _ => {}
        }
    }
}

/// A method body. Debug info and the catch handler list are kept as raw bytes:
/// they only refer to the id pools and to offsets inside themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem
{
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info: Option<Vec<u8>>,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    /// encoded_catch_handler_list, starting with its uleb128 size
    pub handlers: Vec<u8>,
}

impl CodeItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError>
    {
        let code_item_start = *ix;
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;

        let debug_info_off = read_u4(bytes, ix)? as usize;
        let debug_info = if debug_info_off > 0 {
            let mut end = debug_info_off;
            skip_debug_info(bytes, &mut end)
                .map_err(|e| DexError::with_context(e, format!("debug_info_item at 0x{:x}", debug_info_off)))?;
            Some(bytes[debug_info_off..end].to_vec())
        } else { None };

        let insns_size = read_u4(bytes, ix)? as usize;
        if insns_size.saturating_mul(2) > bytes.len().saturating_sub(*ix)
        {
            fail!("insns_size {} overruns the file (code_item_start=0x{:x})", insns_size, code_item_start);
        }
        let mut insns = Vec::with_capacity(insns_size);
        for _ in 0..insns_size { insns.push(read_u2(bytes, ix)?); }

        let mut tries = Vec::with_capacity(tries_size as usize);
        let mut handlers = vec![];
        if tries_size > 0 {
            if (insns_size & 1) != 0 {
                let padding = read_u2(bytes, ix)?;
                if padding != 0 {
                    warn!(
                        "[codeitem] non-zero padding 0x{:04x} at 0x{:x} (code_item_start=0x{:x})",
                        padding, *ix - 2, code_item_start
                    );
                }
            }
            for _ in 0..tries_size { tries.push(TryItem::read(bytes, ix)?); }

            let handlers_base = *ix;
            let handlers_size = read_uleb128(bytes, ix)?;
            for i in 0..handlers_size {
                let entry_off = *ix;
                skip_catch_handler(bytes, ix).map_err(|e| DexError::with_context(e, format!(
                    "encoded_catch_handler #{}/{} at 0x{:x} (code_item_start=0x{:x})",
                    i + 1, handlers_size, entry_off, code_item_start
                )))?;
            }
            let list_len = *ix - handlers_base;
            if let Some(t) = tries.iter().find(|t| t.handler_off as usize >= list_len) {
                fail!("try item handler_off {} outside the handler list (code_item_start=0x{:x})", t.handler_off, code_item_start);
            }
            handlers = bytes[handlers_base..*ix].to_vec();
        }

        Ok(CodeItem { registers_size, ins_size, outs_size, debug_info, insns, tries, handlers })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition
{
    pub field_idx: u32,
    pub access_flags: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition
{
    pub method_idx: u32,
    pub access_flags: AccessFlags,
    pub code: Option<CodeItem>,
}

/// One class_def_item together with everything it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub class_idx: u32,
    /// Type descriptor, e.g. `Lfoo/Bar;`
    pub descriptor: String,
    pub access_flags: AccessFlags,
    pub superclass_idx: u32,
    pub interfaces: Vec<u32>,
    pub source_file_idx: u32,
    pub annotations: AnnotationsDirectory,
    pub static_fields: Vec<FieldDefinition>,
    pub instance_fields: Vec<FieldDefinition>,
    pub direct_methods: Vec<MethodDefinition>,
    pub virtual_methods: Vec<MethodDefinition>,
    pub static_values: Vec<EncodedValue>,
}

impl ClassDefinition
{
    /// The Java form of the class name, e.g. `foo.Bar$Baz`.
    pub fn java_name(&self) -> String
    {
        ObjectIdentifier::from_jni_type(&self.descriptor)
            .map(|o| o.as_java_type())
            .unwrap_or_else(|| self.descriptor.clone())
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition>
    {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    pub fn has_class_data(&self) -> bool
    {
        !(self.static_fields.is_empty()
            && self.instance_fields.is_empty()
            && self.direct_methods.is_empty()
            && self.virtual_methods.is_empty())
    }

    /// The class-level `dalvik.annotation.InnerClass` annotation, if any.
    pub fn inner_class_annotation(&self, pools: &IdPools) -> Option<&AnnotationItem>
    {
        let inner_class_type = pools.type_index(INNER_CLASS_ANNOTATION)?;
        self.annotations
            .class_annotations
            .as_ref()?
            .iter()
            .find(|item| item.annotation.type_idx == inner_class_type)
    }

    fn read(bytes: &[u8], ix: &mut usize, pools: &IdPools) -> Result<ClassDefinition, DexError>
    {
        let class_idx = read_u4(bytes, ix)?;
        let descriptor = match pools.type_descriptor(class_idx)
        {
            Some(d) => d.to_string(),
            None => fail!("Invalid class_idx {}", class_idx),
        };
        let access_flags = AccessFlags::from_raw(read_u4(bytes, ix)?);
        let superclass_idx = read_u4(bytes, ix)?;
        let interfaces_off = read_u4(bytes, ix)?;
        let source_file_idx = read_u4(bytes, ix)?;
        let annotations_off = read_u4(bytes, ix)? as usize;
        let class_data_off = read_u4(bytes, ix)? as usize;
        let static_values_off = read_u4(bytes, ix)? as usize;

        let mut class = ClassDefinition {
            class_idx,
            descriptor,
            access_flags,
            superclass_idx,
            interfaces: TypeList::read_at(bytes, interfaces_off)?,
            source_file_idx,
            annotations: AnnotationsDirectory::default(),
            static_fields: vec![],
            instance_fields: vec![],
            direct_methods: vec![],
            virtual_methods: vec![],
            static_values: vec![],
        };

        if annotations_off > 0 {
            let mut dir_ix = annotations_off;
            class.annotations = AnnotationsDirectory::read(bytes, &mut dir_ix)?;
        }

        if class_data_off > 0 {
            let mut data_ix = class_data_off;
            let static_fields_size = read_uleb128(bytes, &mut data_ix)?;
            let instance_fields_size = read_uleb128(bytes, &mut data_ix)?;
            let direct_methods_size = read_uleb128(bytes, &mut data_ix)?;
            let virtual_methods_size = read_uleb128(bytes, &mut data_ix)?;

            class.static_fields = read_encoded_fields(bytes, &mut data_ix, static_fields_size)?;
            class.instance_fields = read_encoded_fields(bytes, &mut data_ix, instance_fields_size)?;
            class.direct_methods = read_encoded_methods(bytes, &mut data_ix, direct_methods_size)?;
            class.virtual_methods = read_encoded_methods(bytes, &mut data_ix, virtual_methods_size)?;
        }

        if static_values_off > 0 {
            let mut values_ix = static_values_off;
            class.static_values = read_encoded_array(bytes, &mut values_ix)?;
        }

        Ok(class)
    }
}

fn next_index(last: u32, diff: u32) -> Result<u32, DexError>
{
    match last.checked_add(diff)
    {
        Some(idx) => Ok(idx),
        None => fail!("member index overflows (last {}, diff {})", last, diff),
    }
}

fn read_encoded_fields(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<FieldDefinition>, DexError>
{
    let mut fields = Vec::with_capacity((count as usize).min(4096));
    let mut field_idx = 0;
    for _ in 0..count {
        field_idx = next_index(field_idx, read_uleb128(bytes, ix)?)?;
        let access_flags = AccessFlags::from_raw(read_uleb128(bytes, ix)?);
        fields.push(FieldDefinition { field_idx, access_flags });
    }
    Ok(fields)
}

fn read_encoded_methods(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<MethodDefinition>, DexError>
{
    let mut methods = Vec::with_capacity((count as usize).min(4096));
    let mut method_idx = 0;
    for _ in 0..count {
        method_idx = next_index(method_idx, read_uleb128(bytes, ix)?)?;
        let access_flags = AccessFlags::from_raw(read_uleb128(bytes, ix)?);
        let code_off = read_uleb128(bytes, ix)? as usize;
        let code = if code_off > 0 {
            let mut code_ix = code_off;
            Some(CodeItem::read(bytes, &mut code_ix)
                .map_err(|e| DexError::with_context(e, format!("method #{}", method_idx)))?)
        } else { None };
        methods.push(MethodDefinition { method_idx, access_flags, code });
    }
    Ok(methods)
}


/// The decoded, immutable form of one dex file.
///
/// Containers are never modified in place: [`ClassContainer::select`] and
/// [`ClassContainer::with_classes`] build new containers that share the same
/// [`IdPools`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassContainer {
    magic: [u8; 8],
    pools: Arc<IdPools>,
    classes: Vec<ClassDefinition>,
}

impl ClassContainer {
    pub fn new(magic: [u8; 8], pools: Arc<IdPools>, classes: Vec<ClassDefinition>) -> ClassContainer {
        ClassContainer { magic, pools, classes }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ClassContainer, DexError>
    {
        let mut ix = 0;
        let header = Header::read(bytes, &mut ix)?;
        if header.file_size as usize != bytes.len() {
            warn!("dex header file_size {} differs from the {} bytes read", header.file_size, bytes.len());
        }

        let pools = IdPools::read(bytes, &header)?;

        let mut classes = Vec::with_capacity(header.class_defs_size as usize);
        ix = header.class_defs_off as usize;
        for i in 0..header.class_defs_size
        {
            let class = ClassDefinition::read(bytes, &mut ix, &pools)
                .map_err(|e| DexError::with_context(e, format!("class_def #{}", i)))?;
            classes.push(class);
        }

        debug!(
            "decoded dex: {} strings, {} types, {} methods, {} classes",
            pools.strings.len(), pools.types.len(), pools.methods.len(), classes.len()
        );

        Ok(ClassContainer { magic: header.magic, pools: Arc::new(pools), classes })
    }

    /// Encodes the container as a complete dex file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DexError>
    {
        crate::dex::writer::write_container(self)
    }

    pub fn magic(&self) -> [u8; 8] {
        self.magic
    }

    pub fn pools(&self) -> &Arc<IdPools> {
        &self.pools
    }

    pub fn classes(&self) -> &[ClassDefinition] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, descriptor: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.descriptor == descriptor)
    }

    /// A container holding only the named classes, in their original order.
    pub fn select<'a>(&self, descriptors: impl IntoIterator<Item = &'a str>) -> ClassContainer {
        let wanted: HashSet<&str> = descriptors.into_iter().collect();
        let classes = self
            .classes
            .iter()
            .filter(|c| wanted.contains(c.descriptor.as_str()))
            .cloned()
            .collect();
        self.with_classes(classes)
    }

    /// A container with the same version and pools but different class definitions.
    pub fn with_classes(&self, classes: Vec<ClassDefinition>) -> ClassContainer {
        ClassContainer { magic: self.magic, pools: Arc::clone(&self.pools), classes }
    }
}


/// Reads just the Java names of the classes defined in a dex file, in class_def
/// order, without decoding anything else.
pub fn read_class_names(bytes: &[u8]) -> Result<Vec<String>, DexError>
{
    let mut ix = 0;
    let header = Header::read(bytes, &mut ix)?;
    let mut names = Vec::with_capacity(header.class_defs_size as usize);

    for i in 0..header.class_defs_size as usize
    {
        let mut def_ix = header.class_defs_off as usize + i * CLASS_DEF_ITEM_SIZE;
        let class_idx = read_u4(bytes, &mut def_ix)?;
        if class_idx >= header.type_ids_size { fail!("Invalid class_idx {} in class_def #{}", class_idx, i); }

        let mut type_ix = header.type_ids_off as usize + class_idx as usize * 4;
        let string_idx = read_u4(bytes, &mut type_ix)?;
        if string_idx >= header.string_ids_size { fail!("Invalid descriptor_idx {} for type #{}", string_idx, class_idx); }

        let mut string_ix = header.string_ids_off as usize + string_idx as usize * 4;
        let mut data_ix = read_u4(bytes, &mut string_ix)? as usize;
        let descriptor = DexString::read(bytes, &mut data_ix)?;
        let name = descriptor
            .as_str()
            .and_then(ObjectIdentifier::from_jni_type)
            .map(|o| o.as_java_type());
        match name
        {
            Some(name) => names.push(name),
            None => fail!("class_def #{} does not name a class: {:?}", i, descriptor),
        }
    }

    Ok(names)
}
