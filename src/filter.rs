//! Decides which classes may be opened.

/// Packages whose classes are never rewritten: the platform, the test
/// runtime and the mocking libraries that drive the rewrite.
pub const DEFAULT_DISALLOWED_PACKAGES: &[&str] = &[
    "android.",
    "androidx.test.",
    "com.android.",
    "com.github.tmurakami.classinjector.",
    "com.github.tmurakami.dexmockito.",
    "com.github.tmurakami.dexopener.",
    "junit.",
    "kotlin.",
    "kotlinx.",
    "net.bytebuddy.",
    "org.hamcrest.",
    "org.junit.",
    "org.mockito.",
    "org.objenesis.",
];

/// Accepts Java class names (`foo.Bar$Baz`) that are eligible for rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNameFilter {
    disallowed_packages: Vec<String>,
}

impl Default for ClassNameFilter {
    fn default() -> Self {
        ClassNameFilter::new(DEFAULT_DISALLOWED_PACKAGES.iter().map(|p| p.to_string()))
    }
}

impl ClassNameFilter {
    pub fn new(disallowed_packages: impl IntoIterator<Item = String>) -> ClassNameFilter {
        ClassNameFilter { disallowed_packages: disallowed_packages.into_iter().collect() }
    }

    pub fn accept(&self, class_name: &str) -> bool {
        if self.disallowed_packages.iter().any(|p| class_name.starts_with(p.as_str())) {
            return false;
        }
        // generated resource classes
        !(class_name.ends_with(".R") || class_name.contains(".R$") || class_name.ends_with(".BuildConfig"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_framework_and_test_packages() {
        let filter = ClassNameFilter::default();
        for name in [
            "android.app.Activity",
            "androidx.test.runner.AndroidJUnitRunner",
            "com.android.internal.Foo",
            "com.github.tmurakami.dexopener.DexOpener",
            "junit.framework.TestCase",
            "kotlin.Unit",
            "kotlinx.coroutines.Job",
            "net.bytebuddy.ByteBuddy",
            "org.hamcrest.Matcher",
            "org.junit.Test",
            "org.mockito.Mockito",
            "org.objenesis.Objenesis",
        ] {
            assert!(!filter.accept(name), "{} should be rejected", name);
        }
    }

    #[test]
    fn rejects_generated_resource_classes() {
        let filter = ClassNameFilter::default();
        assert!(!filter.accept("foo.R"));
        assert!(!filter.accept("foo.R$string"));
        assert!(!filter.accept("foo.BuildConfig"));
    }

    #[test]
    fn accepts_application_classes() {
        let filter = ClassNameFilter::default();
        assert!(filter.accept("foo.Bar"));
        assert!(filter.accept("foo.Bar$Baz"));
        assert!(filter.accept("foo.Resource"));
        assert!(filter.accept("androidx.appcompat.app.AppCompatActivity"));
        assert!(filter.accept("kotlinish.Thing"));
    }

    #[test]
    fn packages_are_configurable() {
        let filter = ClassNameFilter::new(vec!["com.example.".to_string()]);
        assert!(!filter.accept("com.example.Foo"));
        assert!(filter.accept("android.app.Activity"));
        assert!(!filter.accept("android.R"));
    }
}
