//! Per-test invocation context supplied by the test harness

use crate::mapping::Metadata;

/// Metadata key for the test class (module path in Rust)
pub const META_TEST_CLASS: &str = "test-class";

/// Metadata key for the test method
pub const META_TEST_METHOD: &str = "test-method";

/// Metadata key for the display name
pub const META_TEST_NAME: &str = "test-name";

/// Placeholder for attributes the harness could not supply
pub const UNKNOWN: &str = "unknown";

/// Identity of the test case a lifecycle callback fires for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestContext {
    test_class: Option<String>,
    test_method: Option<String>,
    display_name: String,
}

impl TestContext {
    /// Context for a test case
    #[must_use]
    pub fn for_test(
        test_class: impl Into<String>,
        test_method: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            test_class: Some(test_class.into()),
            test_method: Some(test_method.into()),
            display_name: display_name.into(),
        }
    }

    /// Context for a suite-level hook, which carries no test method
    #[must_use]
    pub fn suite(display_name: impl Into<String>) -> Self {
        Self {
            test_class: None,
            test_method: None,
            display_name: display_name.into(),
        }
    }

    /// Override the test class
    #[must_use]
    pub fn with_test_class(mut self, test_class: Option<String>) -> Self {
        self.test_class = test_class;
        self
    }

    /// Override the test method
    #[must_use]
    pub fn with_test_method(mut self, test_method: Option<String>) -> Self {
        self.test_method = test_method;
        self
    }

    /// Test class, if known
    #[must_use]
    pub fn test_class(&self) -> Option<&str> {
        self.test_class.as_deref()
    }

    /// Test method, if this is a test case
    #[must_use]
    pub fn test_method(&self) -> Option<&str> {
        self.test_method.as_deref()
    }

    /// Human-readable name
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// `{test-class, test-method, test-name}` with `unknown` for gaps
    #[must_use]
    pub fn provenance(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(
            META_TEST_CLASS.to_string(),
            self.test_class().unwrap_or(UNKNOWN).to_string(),
        );
        metadata.insert(
            META_TEST_METHOD.to_string(),
            self.test_method().unwrap_or(UNKNOWN).to_string(),
        );
        metadata.insert(META_TEST_NAME.to_string(), self.display_name.clone());
        metadata
    }
}

/// Build a [`TestContext`] for the enclosing function.
///
/// The class is the module path and the method the function name.
#[macro_export]
macro_rules! test_context {
    ($display_name:expr) => {{
        fn __wirecord_marker() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let marker = __type_name_of(__wirecord_marker);
        let function = marker.strip_suffix("::__wirecord_marker").unwrap_or(marker);
        let function = function.trim_end_matches("::{{closure}}");
        let method = function.rsplit("::").next().unwrap_or(function);
        $crate::context::TestContext::for_test(module_path!(), method, $display_name)
    }};
}
