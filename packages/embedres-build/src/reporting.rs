//! Renders the C++ constructs the generated accessors use to report a failed lookup.

pub const FRAMEWORK_EXCEPTION_HEADER: &str = "OrthancException.h";

pub trait ErrorReporting {
    /// `#include` line bringing the raised type into scope.
    fn include_directive(&self) -> String;
    /// Expression thrown for an identifier outside the enumeration.
    fn out_of_range(&self) -> String;
    /// Expression thrown for a known directory with an unknown path.
    fn inexistent_item(&self) -> String;
}

/// Raises the framework's `OrthancException` with a structured error code.
pub struct FrameworkException {
    framework_path: Option<String>,
}

impl FrameworkException {
    pub fn new(framework_path: Option<&str>) -> Self {
        Self {
            framework_path: framework_path.map(str::to_string),
        }
    }
}

impl ErrorReporting for FrameworkException {
    fn include_directive(&self) -> String {
        match &self.framework_path {
            Some(path) => format!(
                "#include \"{}/{FRAMEWORK_EXCEPTION_HEADER}\"",
                path.trim_end_matches(['/', '\\'])
            ),
            None => format!("#include <{FRAMEWORK_EXCEPTION_HEADER}>"),
        }
    }

    fn out_of_range(&self) -> String {
        "::Orthanc::OrthancException(::Orthanc::ErrorCode_ParameterOutOfRange)".to_string()
    }

    fn inexistent_item(&self) -> String {
        "::Orthanc::OrthancException(::Orthanc::ErrorCode_InexistentItem)".to_string()
    }
}

/// Raises `std::runtime_error`, for code built without the framework.
pub struct SystemException;

impl ErrorReporting for SystemException {
    fn include_directive(&self) -> String {
        "#include <stdexcept>".to_string()
    }

    fn out_of_range(&self) -> String {
        "::std::runtime_error(\"Parameter out of range\")".to_string()
    }

    fn inexistent_item(&self) -> String {
        "::std::runtime_error(\"Unknown path in a directory resource\")".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_include_follows_the_configured_path() {
        let default = FrameworkException::new(None);
        assert_eq!(default.include_directive(), "#include <OrthancException.h>");

        let custom = FrameworkException::new(Some("../Orthanc/Sources/"));
        assert_eq!(
            custom.include_directive(),
            "#include \"../Orthanc/Sources/OrthancException.h\""
        );
        assert!(custom.out_of_range().contains("ErrorCode_ParameterOutOfRange"));
        assert!(custom.inexistent_item().contains("ErrorCode_InexistentItem"));
    }

    #[test]
    fn system_exceptions_use_runtime_error() {
        assert_eq!(SystemException.include_directive(), "#include <stdexcept>");
        assert!(SystemException.out_of_range().starts_with("::std::runtime_error("));
        assert!(SystemException.inexistent_item().starts_with("::std::runtime_error("));
    }
}
