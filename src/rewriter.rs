//! Opens classes for subclassing and mocking by dropping their `final` modifiers.

use crate::dex::annotations::AnnotationItem;
use crate::dex::container::INNER_CLASS_ANNOTATION;
use crate::dex::encoded_values::{AnnotationElement, EncodedValue};
use crate::dex::{ClassContainer, ClassDefinition, IdPools, MethodDefinition};
use crate::types::AccessFlags;
use log::debug;

const ACCESS_FLAGS_ELEMENT: &str = "accessFlags";

/// Clears `FINAL` on classes, on their direct and virtual methods, and in the
/// `accessFlags` of the `InnerClass` annotations that mirror the class flags.
///
/// Fields, code and every other annotation are passed through unchanged. The
/// output only depends on the input, and rewriting twice gives the same
/// container as rewriting once.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinalModifierRewriter;

/// Pool indices needed to recognise `@InnerClass(accessFlags = ...)`.
#[derive(Debug, Clone, Copy)]
struct InnerClassKeys {
    type_idx: u32,
    access_flags_name_idx: u32,
}

impl InnerClassKeys {
    /// `None` when the pools cannot contain such an annotation at all.
    fn lookup(pools: &IdPools) -> Option<InnerClassKeys> {
        Some(InnerClassKeys {
            type_idx: pools.type_index(INNER_CLASS_ANNOTATION)?,
            access_flags_name_idx: pools.string_index(ACCESS_FLAGS_ELEMENT)?,
        })
    }
}

impl FinalModifierRewriter {
    pub fn new() -> FinalModifierRewriter {
        FinalModifierRewriter
    }

    pub fn rewrite(&self, container: &ClassContainer) -> ClassContainer {
        let keys = InnerClassKeys::lookup(container.pools());
        let mut opened = 0;
        let classes: Vec<ClassDefinition> = container
            .classes()
            .iter()
            .map(|class| {
                let rewritten = rewrite_class(class, keys);
                if rewritten != *class {
                    opened += 1;
                }
                rewritten
            })
            .collect();
        debug!("opened {} of {} classes", opened, classes.len());
        container.with_classes(classes)
    }
}

fn rewrite_class(class: &ClassDefinition, keys: Option<InnerClassKeys>) -> ClassDefinition {
    let mut annotations = class.annotations.clone();
    if let (Some(keys), Some(set)) = (keys, annotations.class_annotations.as_mut()) {
        for item in set.iter_mut() {
            *item = rewrite_inner_class(item, keys);
        }
    }

    ClassDefinition {
        access_flags: class.access_flags.without_final(),
        annotations,
        direct_methods: class.direct_methods.iter().map(rewrite_method).collect(),
        virtual_methods: class.virtual_methods.iter().map(rewrite_method).collect(),
        ..class.clone()
    }
}

fn rewrite_method(method: &MethodDefinition) -> MethodDefinition {
    MethodDefinition {
        access_flags: method.access_flags.without_final(),
        ..method.clone()
    }
}

fn rewrite_inner_class(item: &AnnotationItem, keys: InnerClassKeys) -> AnnotationItem {
    if item.annotation.type_idx != keys.type_idx {
        return item.clone();
    }
    let mut rewritten = item.clone();
    rewritten.annotation.elements = item
        .annotation
        .elements
        .iter()
        .map(|element| match element.value {
            EncodedValue::Int(flags) if element.name_idx == keys.access_flags_name_idx => AnnotationElement {
                name_idx: element.name_idx,
                value: EncodedValue::Int(flags & !(AccessFlags::FINAL.bits() as i32)),
            },
            _ => element.clone(),
        })
        .collect();
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{DexFixture, FixtureClass};

    fn inner_flags(container: &ClassContainer, descriptor: &str) -> Option<EncodedValue> {
        let class = container.class(descriptor)?;
        let name_idx = container.pools().string_index(ACCESS_FLAGS_ELEMENT)?;
        class
            .inner_class_annotation(container.pools())?
            .annotation
            .element(name_idx)
            .map(|e| e.value.clone())
    }

    #[test]
    fn clears_final_on_classes_and_methods() {
        let container = DexFixture::new()
            .class(
                FixtureClass::new("Lfoo/Bar;")
                    .final_class()
                    .direct_method("secret", 0x12)
                    .method("run", 0x11)
                    .method("stop", 0x1),
            )
            .build();
        let out = FinalModifierRewriter::new().rewrite(&container);

        let bar = out.class("Lfoo/Bar;").unwrap();
        assert_eq!(bar.access_flags, AccessFlags::PUBLIC);
        assert_eq!(bar.direct_methods[0].access_flags.bits(), 0x2);
        let flags: Vec<u32> = bar.virtual_methods.iter().map(|m| m.access_flags.bits()).collect();
        assert_eq!(flags, vec![0x1, 0x1]);
        assert_eq!(bar.virtual_methods[0].code, container.class("Lfoo/Bar;").unwrap().virtual_methods[0].code);
    }

    #[test]
    fn fields_keep_their_final_bit() {
        let container = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").final_class().field("count", 0x12))
            .build();
        let out = FinalModifierRewriter::new().rewrite(&container);
        assert_eq!(out.classes()[0].instance_fields[0].access_flags.bits(), 0x12);
    }

    #[test]
    fn inner_class_annotation_follows_the_class() {
        let container = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Outer$Inner;").final_class().inner_class("Inner", 0x19))
            .build();
        let out = FinalModifierRewriter::new().rewrite(&container);

        assert_eq!(inner_flags(&out, "Lfoo/Outer$Inner;"), Some(EncodedValue::Int(0x09)));
        // the simple name element is untouched
        let class = out.class("Lfoo/Outer$Inner;").unwrap();
        let annotation = &class.inner_class_annotation(out.pools()).unwrap().annotation;
        let name_idx = out.pools().string_index("name").unwrap();
        assert_eq!(annotation.element(name_idx).map(|e| &e.value), Some(&EncodedValue::String(out.pools().string_index("Inner").unwrap())));
    }

    #[test]
    fn malformed_inner_class_metadata_passes_through() {
        let container = DexFixture::new()
            .class(FixtureClass::new("La/NoFlags;").final_class().inner_class_with("NoFlags", None))
            .class(FixtureClass::new("La/Wrong;").final_class().inner_class_with("Wrong", Some(EncodedValue::Long(0x10))))
            .build();
        let out = FinalModifierRewriter::new().rewrite(&container);

        assert_eq!(out.class("La/Wrong;").unwrap().annotations, container.class("La/Wrong;").unwrap().annotations);
        assert_eq!(out.class("La/NoFlags;").unwrap().annotations, container.class("La/NoFlags;").unwrap().annotations);
        assert!(!out.class("La/Wrong;").unwrap().access_flags.is_final());
        assert!(!out.class("La/NoFlags;").unwrap().access_flags.is_final());
    }

    #[test]
    fn rewriting_is_pure_and_idempotent() {
        let container = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").final_class().method("run", 0x11).inner_class("Bar", 0x11))
            .class(FixtureClass::new("Lfoo/Baz;"))
            .build();
        let before = container.clone();
        let rewriter = FinalModifierRewriter::new();

        let once = rewriter.rewrite(&container);
        assert_eq!(container, before);
        assert_eq!(rewriter.rewrite(&container), once);
        assert_eq!(rewriter.rewrite(&once), once);
        assert_eq!(once.to_bytes().unwrap(), rewriter.rewrite(&container).to_bytes().unwrap());
    }

    #[test]
    fn rewritten_containers_encode_and_decode() {
        let container = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").final_class().method("run", 0x11).inner_class("Bar", 0x11))
            .build();
        let out = FinalModifierRewriter::new().rewrite(&container);
        let decoded = ClassContainer::from_bytes(&out.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.classes(), out.classes());
    }
}
