use std::collections::BTreeMap;

use crate::dex::{ClassContainer, ClassDefinition};
use crate::rewriter::FinalModifierRewriter;
use crate::tests::fixtures::{DexFixture, FixtureClass};
use crate::types::AccessFlags;

fn class_map(container: &ClassContainer) -> BTreeMap<String, ClassDefinition> {
    container.classes().iter().map(|c| (c.descriptor.clone(), c.clone())).collect()
}

/// Descriptors whose definitions differ, at most five of them.
fn differing(a: &BTreeMap<String, ClassDefinition>, b: &BTreeMap<String, ClassDefinition>) -> (usize, Vec<String>) {
    let mut sample = Vec::new();
    let mut diff_count = 0usize;
    for desc in a.keys().chain(b.keys().filter(|k| !a.contains_key(*k))) {
        let note = match (a.get(desc), b.get(desc)) {
            (Some(x), Some(y)) if x == y => continue,
            (Some(_), Some(_)) => format!("{desc} changed"),
            (Some(_), None) => format!("{desc} missing from rebuilt output"),
            _ => format!("{desc} missing from original output"),
        };
        diff_count += 1;
        if sample.len() < 5 {
            sample.push(note);
        }
    }
    (diff_count, sample)
}

fn app_fixture() -> DexFixture {
    DexFixture::new()
        .class(
            FixtureClass::new("Lcom/example/Repository;")
                .final_class()
                .direct_method("<init>", 0x10001)
                .direct_method("cached", 0x1a)
                .method("load", 0x11)
                .method("save", 0x1)
                .field("size", 0x12),
        )
        .class(FixtureClass::new("Lcom/example/Repository$Entry;").final_class().inner_class("Entry", 0x19))
        .class(FixtureClass::new("Lcom/example/Listener;").abstract_method("onEvent", 0x401))
        .numbered("com/example/gen", 40)
}

#[test]
fn rebuilds_a_container_without_changing_its_classes() {
    let original = app_fixture().build();
    let bytes = original.to_bytes().expect("encode");
    let decoded = ClassContainer::from_bytes(&bytes).expect("decode");

    let (diff_count, sample) = differing(&class_map(&original), &class_map(&decoded));
    assert!(
        diff_count == 0,
        "class mismatch after rebuild: {diff_count} differing classes (examples: {})",
        sample.join(", ")
    );
    assert_eq!(**decoded.pools(), **original.pools());
    assert_eq!(decoded.to_bytes().expect("re-encode"), bytes);
}

#[test]
fn rewriting_only_touches_final_modifiers() {
    let original = ClassContainer::from_bytes(&app_fixture().to_bytes()).expect("decode");
    let rewritten = ClassContainer::from_bytes(&FinalModifierRewriter::new().rewrite(&original).to_bytes().unwrap()).unwrap();

    let mut expected = class_map(&original);
    for class in expected.values_mut() {
        class.access_flags = class.access_flags.without_final();
        for method in class.direct_methods.iter_mut().chain(class.virtual_methods.iter_mut()) {
            method.access_flags = method.access_flags.without_final();
        }
    }
    let actual = class_map(&rewritten);
    let (diff_count, sample) = differing(&expected, &actual);
    // only the InnerClass annotation of Repository$Entry may differ beyond flags
    assert!(diff_count <= 1, "unexpected changes: {}", sample.join(", "));

    let entry = &actual["Lcom/example/Repository$Entry;"];
    let flags = entry
        .inner_class_annotation(rewritten.pools())
        .and_then(|item| item.annotation.element(rewritten.pools().string_index("accessFlags")?))
        .and_then(|element| element.value.as_int());
    assert_eq!(flags, Some(0x09));

    let repository = &actual["Lcom/example/Repository;"];
    assert_eq!(repository.instance_fields[0].access_flags, AccessFlags::from_raw(0x12));
    assert!(repository.methods().all(|m| !m.access_flags.is_final()));
}
