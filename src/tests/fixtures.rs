//! Builds small dex files in memory, so tests do not depend on binary fixtures.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::dex::annotations::{AnnotationItem, AnnotationsDirectory, VISIBILITY_SYSTEM};
use crate::dex::container::{
    DexString, FieldItem, MethodItem, PrototypeItem, DEX_FILE_MAGIC, INNER_CLASS_ANNOTATION, NO_INDEX,
};
use crate::dex::encoded_values::{AnnotationElement, EncodedAnnotation, EncodedValue};
use crate::dex::{ClassContainer, ClassDefinition, CodeItem, FieldDefinition, IdPools, MethodDefinition};
use crate::types::AccessFlags;

const OBJECT: &str = "Ljava/lang/Object;";

/// `return-void`
fn return_void() -> CodeItem {
    CodeItem {
        registers_size: 1,
        ins_size: 1,
        outs_size: 0,
        debug_info: None,
        insns: vec![0x000e],
        tries: vec![],
        handlers: vec![],
    }
}

#[derive(Clone)]
pub struct FixtureClass {
    descriptor: String,
    access_flags: u32,
    superclass: bool,
    direct_methods: Vec<(String, u32, Option<CodeItem>)>,
    virtual_methods: Vec<(String, u32, Option<CodeItem>)>,
    fields: Vec<(String, u32)>,
    inner_class: Option<(String, Option<EncodedValue>)>,
}

impl FixtureClass {
    pub fn new(descriptor: &str) -> FixtureClass {
        FixtureClass {
            descriptor: descriptor.to_string(),
            access_flags: AccessFlags::PUBLIC.bits(),
            superclass: true,
            direct_methods: vec![],
            virtual_methods: vec![],
            fields: vec![],
            inner_class: None,
        }
    }

    pub fn final_class(mut self) -> FixtureClass {
        self.access_flags |= AccessFlags::FINAL.bits();
        self
    }

    pub fn no_superclass(mut self) -> FixtureClass {
        self.superclass = false;
        self
    }

    /// A virtual `()V` method whose body is `return-void`.
    pub fn method(self, name: &str, access_flags: u32) -> FixtureClass {
        self.method_with_code(name, access_flags, return_void())
    }

    pub fn method_with_code(mut self, name: &str, access_flags: u32, code: CodeItem) -> FixtureClass {
        self.virtual_methods.push((name.to_string(), access_flags, Some(code)));
        self
    }

    pub fn direct_method(mut self, name: &str, access_flags: u32) -> FixtureClass {
        self.direct_methods.push((name.to_string(), access_flags, Some(return_void())));
        self
    }

    pub fn abstract_method(mut self, name: &str, access_flags: u32) -> FixtureClass {
        self.virtual_methods.push((name.to_string(), access_flags, None));
        self
    }

    /// An instance field of type `I`.
    pub fn field(mut self, name: &str, access_flags: u32) -> FixtureClass {
        self.fields.push((name.to_string(), access_flags));
        self
    }

    /// Attaches `@InnerClass(accessFlags = flags, name = simple_name)`.
    pub fn inner_class(self, simple_name: &str, flags: i32) -> FixtureClass {
        self.inner_class_with(simple_name, Some(EncodedValue::Int(flags)))
    }

    /// Like [`FixtureClass::inner_class`] with an arbitrary (or missing) `accessFlags` value.
    pub fn inner_class_with(mut self, simple_name: &str, flags: Option<EncodedValue>) -> FixtureClass {
        self.inner_class = Some((simple_name.to_string(), flags));
        self
    }
}

#[derive(Default)]
pub struct DexFixture {
    classes: Vec<FixtureClass>,
}

impl DexFixture {
    pub fn new() -> DexFixture {
        DexFixture::default()
    }

    pub fn class(mut self, class: FixtureClass) -> DexFixture {
        self.classes.push(class);
        self
    }

    /// `count` empty classes `L<package>/C0;`, `L<package>/C1;`, ...
    pub fn numbered(mut self, package: &str, count: usize) -> DexFixture {
        for i in 0..count {
            self.classes.push(FixtureClass::new(&format!("L{}/C{};", package, i)));
        }
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.build().to_bytes().expect("encode fixture")
    }

    pub fn build(&self) -> ClassContainer {
        let mut strings: BTreeSet<String> = BTreeSet::new();
        let mut type_names: BTreeSet<String> = BTreeSet::new();
        for s in ["V", OBJECT] {
            strings.insert(s.to_string());
            type_names.insert(s.to_string());
        }
        for class in &self.classes {
            strings.insert(class.descriptor.clone());
            type_names.insert(class.descriptor.clone());
            for (name, _, _) in class.direct_methods.iter().chain(class.virtual_methods.iter()) {
                strings.insert(name.clone());
            }
            for (name, _) in &class.fields {
                strings.insert(name.clone());
                strings.insert("I".to_string());
                type_names.insert("I".to_string());
            }
            if let Some((simple_name, _)) = &class.inner_class {
                for s in [INNER_CLASS_ANNOTATION, "accessFlags", "name", simple_name.as_str()] {
                    strings.insert(s.to_string());
                }
                type_names.insert(INNER_CLASS_ANNOTATION.to_string());
            }
        }

        let strings: Vec<String> = strings.into_iter().collect();
        let string_idx = |s: &str| strings.iter().position(|x| x == s).expect("string in pool") as u32;
        let mut types: Vec<u32> = type_names.iter().map(|t| string_idx(t)).collect();
        types.sort_unstable();
        let type_idx = |d: &str| types.iter().position(|t| *t == string_idx(d)).expect("type in pool") as u32;

        let prototypes = vec![PrototypeItem { shorty_idx: string_idx("V"), return_type_idx: type_idx("V"), parameters: vec![] }];

        let mut fields = vec![];
        let mut methods = vec![];
        for class in &self.classes {
            let class_idx = type_idx(&class.descriptor);
            for (name, _) in &class.fields {
                fields.push(FieldItem { class_idx, type_idx: type_idx("I"), name_idx: string_idx(name) });
            }
            for (name, _, _) in class.direct_methods.iter().chain(class.virtual_methods.iter()) {
                methods.push(MethodItem { class_idx, proto_idx: 0, name_idx: string_idx(name) });
            }
        }
        fields.sort_by_key(|f| (f.class_idx, f.name_idx, f.type_idx));
        methods.sort_by_key(|m| (m.class_idx, m.name_idx, m.proto_idx));
        let field_idx = |class_idx: u32, name: &str| {
            fields.iter().position(|f| f.class_idx == class_idx && f.name_idx == string_idx(name)).expect("field") as u32
        };
        let method_idx = |class_idx: u32, name: &str| {
            methods.iter().position(|m| m.class_idx == class_idx && m.name_idx == string_idx(name)).expect("method") as u32
        };

        let mut classes = vec![];
        for class in &self.classes {
            let class_idx = type_idx(&class.descriptor);
            let to_methods = |list: &[(String, u32, Option<CodeItem>)]| {
                let mut defs: Vec<MethodDefinition> = list
                    .iter()
                    .map(|(name, flags, code)| MethodDefinition {
                        method_idx: method_idx(class_idx, name),
                        access_flags: AccessFlags::from_raw(*flags),
                        code: code.clone(),
                    })
                    .collect();
                defs.sort_by_key(|m| m.method_idx);
                defs
            };
            let mut instance_fields: Vec<FieldDefinition> = class
                .fields
                .iter()
                .map(|(name, flags)| FieldDefinition {
                    field_idx: field_idx(class_idx, name),
                    access_flags: AccessFlags::from_raw(*flags),
                })
                .collect();
            instance_fields.sort_by_key(|f| f.field_idx);

            let mut annotations = AnnotationsDirectory::default();
            if let Some((simple_name, flags)) = &class.inner_class {
                let mut elements = vec![];
                if let Some(flags) = flags {
                    elements.push(AnnotationElement { name_idx: string_idx("accessFlags"), value: flags.clone() });
                }
                elements.push(AnnotationElement { name_idx: string_idx("name"), value: EncodedValue::String(string_idx(simple_name)) });
                annotations.class_annotations = Some(vec![AnnotationItem {
                    visibility: VISIBILITY_SYSTEM,
                    annotation: EncodedAnnotation { type_idx: type_idx(INNER_CLASS_ANNOTATION), elements },
                }]);
            }

            classes.push(ClassDefinition {
                class_idx,
                descriptor: class.descriptor.clone(),
                access_flags: AccessFlags::from_raw(class.access_flags),
                superclass_idx: if class.superclass { type_idx(OBJECT) } else { NO_INDEX },
                interfaces: vec![],
                source_file_idx: NO_INDEX,
                annotations,
                static_fields: vec![],
                instance_fields,
                direct_methods: to_methods(&class.direct_methods),
                virtual_methods: to_methods(&class.virtual_methods),
                static_values: vec![],
            });
        }

        let pools = IdPools {
            strings: strings.iter().map(|s| DexString::from_string(s)).collect(),
            types,
            prototypes,
            fields,
            methods,
            method_handles: vec![],
            call_sites: vec![],
        };
        ClassContainer::new(DEX_FILE_MAGIC, Arc::new(pools), classes)
    }
}
