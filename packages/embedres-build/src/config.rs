use std::{
    collections::HashSet,
    env,
    ffi::OsString,
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::{
    error::ConfigError,
    reporting::{ErrorReporting, FrameworkException, SystemException},
};

pub const DEFAULT_NAMESPACE: &str = "Orthanc.EmbeddedResources";
pub const DEFAULT_BACKUP_MARKER: &str = "~";
pub const CARGO_MANIFEST_NAME: &str = "resources.toml";
pub const CARGO_TARGET_NAME: &str = "EmbeddedResources";

/// How the generated accessors signal a failed lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Raise the framework's structured exception type.
    #[default]
    Framework,
    /// Raise `std::runtime_error`.
    System,
}

impl ErrorMode {
    pub fn reporter(self, framework_path: Option<&str>) -> Box<dyn ErrorReporting> {
        match self {
            ErrorMode::Framework => Box::new(FrameworkException::new(framework_path)),
            ErrorMode::System => Box::new(SystemException),
        }
    }
}

impl std::str::FromStr for ErrorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "framework" => Ok(ErrorMode::Framework),
            "system" => Ok(ErrorMode::System),
            other => Err(ConfigError::UnknownErrorMode(other.to_string())),
        }
    }
}

/// A named file or directory the invoker wants embedded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    pub path: PathBuf,
}

pub struct Options {
    target: PathBuf,
    resources: Vec<ResourceSpec>,
    namespace: String,
    upcase_check: bool,
    error_mode: ErrorMode,
    framework_path: Option<String>,
    backup_marker: String,
    emit_cargo: bool,
    seen: HashSet<PathBuf>,
}

impl Options {
    /// Options writing `<target>.h` and `<target>.cpp`, with every setting at its default.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            resources: vec![],
            namespace: DEFAULT_NAMESPACE.to_string(),
            upcase_check: true,
            error_mode: ErrorMode::default(),
            framework_path: None,
            backup_marker: DEFAULT_BACKUP_MARKER.to_string(),
            emit_cargo: false,
            seen: HashSet::new(),
        }
    }

    /// Defaults for a `build.rs`: read `resources.toml` from the crate directory
    /// and generate `EmbeddedResources.{h,cpp}` inside `OUT_DIR`.
    pub fn cargo_defaults() -> Result<Self> {
        let out_dir = env::var_os("OUT_DIR").context("OUT_DIR not defined")?;
        let mut opts = Self::new(PathBuf::from(out_dir).join(CARGO_TARGET_NAME));
        opts.emit_cargo = true;
        let manifest = env::current_dir()?.join(CARGO_MANIFEST_NAME);
        opts.load_manifest(&manifest)?;
        Ok(opts)
    }

    pub fn with_resource(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.add_resource(name, path);
        self
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self
        }
    }

    pub fn with_upcase_check(self, upcase_check: bool) -> Self {
        Self {
            upcase_check,
            ..self
        }
    }

    pub fn with_error_mode(self, error_mode: ErrorMode) -> Self {
        Self { error_mode, ..self }
    }

    pub fn with_framework_path(self, framework_path: impl Into<String>) -> Self {
        Self {
            framework_path: Some(framework_path.into()),
            ..self
        }
    }

    pub fn with_backup_marker(self, backup_marker: impl Into<String>) -> Self {
        Self {
            backup_marker: backup_marker.into(),
            ..self
        }
    }

    pub fn add_resource(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.resources.push(ResourceSpec {
            name: name.into(),
            path: path.into(),
        });
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn namespace_segments(&self) -> impl Iterator<Item = &str> {
        self.namespace.split('.')
    }

    pub fn upcase_check(&self) -> bool {
        self.upcase_check
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn framework_path(&self) -> Option<&str> {
        self.framework_path.as_deref()
    }

    pub fn backup_marker(&self) -> &str {
        &self.backup_marker
    }

    pub fn reporter(&self) -> Box<dyn ErrorReporting> {
        self.error_mode.reporter(self.framework_path())
    }

    pub fn header_path(&self) -> PathBuf {
        self.target_with_suffix(".h")
    }

    pub fn source_path(&self) -> PathBuf {
        self.target_with_suffix(".cpp")
    }

    /// The name the definitions file uses to include the declarations file.
    pub(crate) fn header_include_name(&self) -> String {
        self.header_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    // The base name may itself contain dots, so the suffix is appended rather
    // than swapped in as an extension.
    fn target_with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = OsString::from(self.target.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.as_os_str().is_empty() || self.target.file_name().is_none() {
            return Err(ConfigError::EmptyTarget);
        }
        for segment in self.namespace_segments() {
            if !is_identifier(segment) {
                return Err(ConfigError::InvalidNamespace {
                    namespace: self.namespace.clone(),
                    segment: segment.to_string(),
                });
            }
        }
        if self.backup_marker.is_empty() {
            return Err(ConfigError::EmptyBackupMarker);
        }
        Ok(())
    }

    pub(crate) fn track_input(&mut self, path: &Path) {
        if self.emit_cargo && self.seen.insert(path.to_path_buf()) {
            println!("cargo:rerun-if-changed={}", path.display());
        }
    }

    /// A buffered temporary file next to `path`; it only replaces `path` once persisted.
    pub(crate) fn output_file(&self, path: &Path) -> Result<BufWriter<NamedTempFile>> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create output directory {}", dir.display()))?;
        let file = NamedTempFile::new_in(dir)
            .with_context(|| format!("could not create temporary file in {}", dir.display()))?;
        // temporary files start out owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }
        Ok(BufWriter::new(file))
    }

    /// Reads a resource manifest. Settings come from the given file only;
    /// resources are appended from it and then from its imports, depth first.
    pub fn load_manifest(&mut self, path: &Path) -> Result<()> {
        let mut loaded = HashSet::new();
        let mut files = vec![path.to_path_buf()];
        let mut is_root = true;
        while let Some(path) = files.pop() {
            self.track_input(&path);
            let canonical = fs::canonicalize(&path)
                .with_context(|| format!("could not read manifest {}", path.display()))?;
            if !loaded.insert(canonical) {
                bail!("manifest {} is imported more than once", path.display());
            }
            let text = fs::read_to_string(&path)
                .with_context(|| format!("could not read manifest {}", path.display()))?;
            let file: RawManifest = toml::from_str(&text)
                .with_context(|| format!("could not parse manifest {}", path.display()))?;
            let Some(dir) = path.parent() else {
                bail!("invalid manifest path {}", path.display());
            };

            if is_root {
                self.apply_settings(&file, dir);
                is_root = false;
            }
            for resource in file.resources {
                self.add_resource(resource.name, dir.join(resource.path));
            }
            for import in file.imports.iter().rev() {
                files.push(dir.join(import));
            }
        }
        Ok(())
    }

    fn apply_settings(&mut self, file: &RawManifest, dir: &Path) {
        if let Some(namespace) = &file.namespace {
            self.namespace = namespace.clone();
        }
        if let Some(upcase_check) = file.upcase_check {
            self.upcase_check = upcase_check;
        }
        if let Some(error_mode) = file.error_mode {
            self.error_mode = error_mode;
        }
        if let Some(framework_path) = &file.framework_path {
            self.framework_path = Some(dir.join(framework_path).to_string_lossy().into_owned());
        }
        if let Some(backup_marker) = &file.backup_marker {
            self.backup_marker = backup_marker.clone();
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    imports: Vec<PathBuf>,
    namespace: Option<String>,
    upcase_check: Option<bool>,
    error_mode: Option<ErrorMode>,
    framework_path: Option<PathBuf>,
    backup_marker: Option<String>,
    #[serde(rename = "resource", default)]
    resources: Vec<RawResource>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawResource {
    name: String,
    path: PathBuf,
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_siblings_of_the_target() {
        let opts = Options::new("out/gen/Resources.v2");
        assert_eq!(opts.header_path(), PathBuf::from("out/gen/Resources.v2.h"));
        assert_eq!(opts.source_path(), PathBuf::from("out/gen/Resources.v2.cpp"));
        assert_eq!(opts.header_include_name(), "Resources.v2.h");
    }

    #[test]
    fn defaults() {
        let opts = Options::new("Resources");
        assert_eq!(opts.namespace(), DEFAULT_NAMESPACE);
        assert!(opts.upcase_check());
        assert_eq!(opts.error_mode(), ErrorMode::Framework);
        assert_eq!(opts.framework_path(), None);
        assert_eq!(opts.backup_marker(), "~");
        assert_eq!(opts.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_namespace_segments() {
        for namespace in ["", "Orthanc..Resources", "My-App", "1st.Resources"] {
            let opts = Options::new("Resources").with_namespace(namespace);
            assert!(
                matches!(opts.validate(), Err(ConfigError::InvalidNamespace { .. })),
                "namespace {namespace:?} should be rejected"
            );
        }
        let opts = Options::new("Resources").with_namespace("A.b_2._C");
        assert_eq!(opts.validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_target_and_marker() {
        assert_eq!(Options::new("").validate(), Err(ConfigError::EmptyTarget));
        assert_eq!(
            Options::new("Resources").with_backup_marker("").validate(),
            Err(ConfigError::EmptyBackupMarker)
        );
    }

    #[test]
    fn error_mode_from_str() {
        assert_eq!("system".parse::<ErrorMode>(), Ok(ErrorMode::System));
        assert_eq!("framework".parse::<ErrorMode>(), Ok(ErrorMode::Framework));
        assert_eq!(
            "exceptions".parse::<ErrorMode>(),
            Err(ConfigError::UnknownErrorMode("exceptions".to_string()))
        );
    }

    #[test]
    fn manifest_settings_and_ordered_imports() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("more"))?;
        fs::write(
            dir.path().join("resources.toml"),
            r#"
imports = ["more/extra.toml"]
namespace = "App.Assets"
upcase_check = false
error_mode = "system"
backup_marker = ".bak"

[[resource]]
name = "logo"
path = "logo.png"

[[resource]]
name = "web"
path = "web"
"#,
        )?;
        fs::write(
            dir.path().join("more/extra.toml"),
            r#"
namespace = "Ignored"

[[resource]]
name = "fonts"
path = "fonts"
"#,
        )?;

        let mut opts = Options::new("Resources").with_resource("first", "/tmp/first");
        opts.load_manifest(&dir.path().join("resources.toml"))?;

        assert_eq!(opts.namespace(), "App.Assets");
        assert!(!opts.upcase_check());
        assert_eq!(opts.error_mode(), ErrorMode::System);
        assert_eq!(opts.backup_marker(), ".bak");
        let names: Vec<_> = opts.resources().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["first", "logo", "web", "fonts"]);
        assert_eq!(opts.resources()[1].path, dir.path().join("logo.png"));
        assert_eq!(opts.resources()[3].path, dir.path().join("more").join("fonts"));
        Ok(())
    }

    #[test]
    fn manifest_import_cycle_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.toml"), "imports = [\"b.toml\"]\n")?;
        fs::write(dir.path().join("b.toml"), "imports = [\"a.toml\"]\n")?;
        let mut opts = Options::new("Resources");
        assert!(opts.load_manifest(&dir.path().join("a.toml")).is_err());
        Ok(())
    }

    #[test]
    fn manifest_rejects_unknown_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("resources.toml"), "compress = true\n")?;
        let mut opts = Options::new("Resources");
        assert!(opts.load_manifest(&dir.path().join("resources.toml")).is_err());
        Ok(())
    }
}
