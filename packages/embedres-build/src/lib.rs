//! Compiles files and directory trees into C++ sources that embed their bytes,
//! together with accessors that look them up by identifier and path.
//!
//! From a `build.rs`:
//!
//! ```no_run
//! embedres_build::generate(embedres_build::Options::cargo_defaults()?)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod codegen;
mod config;
mod error;
mod reporting;
mod scan;
mod serialize;

use anyhow::Result;
use tracing::info;

pub use config::{DEFAULT_BACKUP_MARKER, DEFAULT_NAMESPACE, ErrorMode, Options, ResourceSpec};
pub use error::{ConfigError, ScanError};
pub use reporting::{ErrorReporting, FrameworkException, SystemException};
pub use scan::{Catalog, DirectoryEntry, DirectoryResource, EmbeddedFile, FileResource};
pub use serialize::{ByteArray, byte_array, decode as decode_byte_array};

/// Scans every declared resource and writes `<target>.h` and `<target>.cpp`.
///
/// Nothing is written unless the whole catalog could be built.
pub fn generate(mut opts: Options) -> Result<Catalog> {
    opts.validate()?;
    let catalog = scan::scan(&mut opts)?;
    info!(
        "embedding {} files and {} directories ({} entries) under {}",
        catalog.files().len(),
        catalog.directories().len(),
        catalog.len(),
        opts.namespace()
    );
    codegen::generate(&opts, &catalog)?;
    Ok(catalog)
}
