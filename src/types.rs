//! Access flags and class name conversions shared by the dex model and the opener.

use bitflags::bitflags;

bitflags! {
    /// access_flags of classes, fields and methods.
    ///
    /// Several bits mean different things depending on the item they belong to
    /// (`VOLATILE`/`BRIDGE`, `TRANSIENT`/`VARARGS`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    /// Keeps unknown bits so that rewriting never loses information.
    pub fn from_raw(bits: u32) -> AccessFlags {
        AccessFlags::from_bits_retain(bits)
    }

    pub fn is_final(&self) -> bool {
        self.contains(AccessFlags::FINAL)
    }

    pub fn without_final(self) -> AccessFlags {
        self.difference(AccessFlags::FINAL)
    }
}

/// Represents a class name: `foo.Bar$Baz` in Java form, `Lfoo/Bar$Baz;` as a descriptor.
///
/// # Examples
///
/// ```
/// use dexopener::types::ObjectIdentifier;
///
/// let o = ObjectIdentifier::from_java_type("com.basic.Test");
/// assert_eq!(o.as_jni_type(), "Lcom/basic/Test;");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    class_name: String,
}

impl ObjectIdentifier {
    /// `None` for primitives, arrays and anything else that is not `L...;`.
    pub fn from_jni_type(t: &str) -> Option<ObjectIdentifier> {
        let class_name = t.strip_prefix('L')?.strip_suffix(';')?;
        if class_name.is_empty() {
            return None;
        }
        Some(ObjectIdentifier { class_name: class_name.to_string() })
    }

    pub fn from_java_type(t: &str) -> ObjectIdentifier {
        let class_name = t.replace('.', "/");
        ObjectIdentifier { class_name }
    }

    pub fn as_jni_type(&self) -> String {
        format!("L{};", self.class_name)
    }

    pub fn as_java_type(&self) -> String {
        self.class_name.replace('/', ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identifier_to_jni() {
        let o = ObjectIdentifier::from_java_type("com.basic.Test");
        assert_eq!(o.as_java_type(), "com.basic.Test");
        assert_eq!(o.as_jni_type(), "Lcom/basic/Test;");
    }

    #[test]
    fn object_identifier_to_java() {
        let o = ObjectIdentifier::from_jni_type("Lcom/basic/Test$Inner;").unwrap();
        assert_eq!(o.as_jni_type(), "Lcom/basic/Test$Inner;");
        assert_eq!(o.as_java_type(), "com.basic.Test$Inner");
    }

    #[test]
    fn non_class_descriptors_are_rejected() {
        assert!(ObjectIdentifier::from_jni_type("I").is_none());
        assert!(ObjectIdentifier::from_jni_type("[Lfoo/Bar;").is_none());
        assert!(ObjectIdentifier::from_jni_type("L;").is_none());
    }

    #[test]
    fn final_bit_is_cleared_and_unknown_bits_kept() {
        let flags = AccessFlags::from_raw(0x0008_0011);
        assert!(flags.is_final());
        let opened = flags.without_final();
        assert!(!opened.is_final());
        assert_eq!(opened.bits(), 0x0008_0001);
        assert_eq!(opened.without_final(), opened);
    }
}
