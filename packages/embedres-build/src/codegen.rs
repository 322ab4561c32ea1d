use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    Options,
    reporting::ErrorReporting,
    scan::{Catalog, EmbeddedFile},
    serialize::byte_array,
};

const GET_FILE_BUFFER: &str = "const void* GetFileResourceBuffer(FileResourceId id)";
const GET_FILE_SIZE: &str = "size_t GetFileResourceSize(FileResourceId id)";
const GET_FILE: &str = "void GetFileResource(std::string& result, FileResourceId id)";
const GET_DIRECTORY_BUFFER: &str =
    "const void* GetDirectoryResourceBuffer(DirectoryResourceId id, const char* path)";
const GET_DIRECTORY_SIZE: &str =
    "size_t GetDirectoryResourceSize(DirectoryResourceId id, const char* path)";
const GET_DIRECTORY: &str =
    "void GetDirectoryResource(std::string& result, DirectoryResourceId id, const char* path)";
const LIST_RESOURCES: &str =
    "void ListResources(std::list<std::string>& result, DirectoryResourceId id)";

/// Writes `<target>.h` and `<target>.cpp`. Both are staged in temporary files
/// and only moved into place once both have been written completely. The
/// source is renamed first; each rename is atomic, the pair is not.
pub fn generate(opts: &Options, catalog: &Catalog) -> Result<()> {
    let header_path = opts.header_path();
    let source_path = opts.source_path();
    let reporter = opts.reporter();

    let mut header = opts.output_file(&header_path)?;
    write_declarations(&mut header, opts, catalog)?;

    let mut source = opts.output_file(&source_path)?;
    write_definitions(&mut source, opts, catalog, reporter.as_ref())?;

    // the header is never newer than the definitions behind it
    commit(source, &source_path)?;
    commit(header, &header_path)?;
    info!(
        "wrote {} and {}",
        header_path.display(),
        source_path.display()
    );
    Ok(())
}

fn commit(file: BufWriter<NamedTempFile>, path: &Path) -> Result<()> {
    let file = file
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("could not write {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("could not replace {}", path.display()))?;
    Ok(())
}

pub fn write_declarations(out: &mut impl Write, opts: &Options, catalog: &Catalog) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "#pragma once")?;
    writeln!(out)?;
    writeln!(out, "#include <stddef.h>")?;
    writeln!(out, "#include <string>")?;
    writeln!(out, "#include <list>")?;
    writeln!(out)?;
    writeln!(out, "#if defined(_MSC_VER)")?;
    writeln!(
        out,
        "#  pragma warning(disable: 4065)  \
         // \"Switch statement contains 'default' but no 'case' labels\""
    )?;
    writeln!(out, "#endif")?;
    writeln!(out)?;
    open_namespaces(out, opts)?;

    writeln!(out)?;
    write_enum(
        out,
        "FileResourceId",
        catalog.files().iter().map(|f| f.identifier.as_str()),
    )?;
    writeln!(out)?;
    write_enum(
        out,
        "DirectoryResourceId",
        catalog.directories().iter().map(|d| d.identifier.as_str()),
    )?;
    writeln!(out)?;

    let groups: [&[&str]; 3] = [
        &[GET_FILE_BUFFER, GET_FILE_SIZE, GET_FILE],
        &[GET_DIRECTORY_BUFFER, GET_DIRECTORY_SIZE, GET_DIRECTORY],
        &[LIST_RESOURCES],
    ];
    for group in groups {
        for signature in group {
            writeln!(out, "    {signature};")?;
        }
        writeln!(out)?;
    }

    close_namespaces(out, opts)?;
    out.flush()?;
    Ok(())
}

pub fn write_definitions(
    out: &mut impl Write,
    opts: &Options,
    catalog: &Catalog,
    reporter: &dyn ErrorReporting,
) -> Result<()> {
    writeln!(out, "#include \"{}\"", opts.header_include_name())?;
    writeln!(out, "{}", reporter.include_directive())?;
    writeln!(out)?;
    writeln!(out, "#include <stdint.h>")?;
    writeln!(out, "#include <string.h>")?;
    writeln!(out)?;
    open_namespaces(out, opts)?;

    for file in catalog.embedded() {
        write_resource(out, file)?;
    }

    write_file_accessors(out, catalog, reporter)?;
    write_directory_accessors(out, catalog, reporter)?;
    write_list_resources(out, catalog, reporter)?;
    write_convenience_wrappers(out)?;

    close_namespaces(out, opts)?;
    out.flush()?;
    Ok(())
}

fn open_namespaces(out: &mut impl Write, opts: &Options) -> Result<()> {
    for segment in opts.namespace_segments() {
        writeln!(out, "namespace {segment} {{")?;
    }
    Ok(())
}

fn close_namespaces(out: &mut impl Write, opts: &Options) -> Result<()> {
    for _ in opts.namespace_segments() {
        writeln!(out, "}}")?;
    }
    Ok(())
}

fn write_enum<'a>(
    out: &mut impl Write,
    name: &str,
    identifiers: impl Iterator<Item = &'a str>,
) -> Result<()> {
    writeln!(out, "    enum {name}")?;
    writeln!(out, "    {{")?;
    let identifiers: Vec<_> = identifiers.map(|id| format!("      {id}")).collect();
    if !identifiers.is_empty() {
        writeln!(out, "{}", identifiers.join(",\n"))?;
    }
    writeln!(out, "    }};")?;
    Ok(())
}

fn write_resource(out: &mut impl Write, file: &EmbeddedFile) -> Result<()> {
    let content = fs::read(&file.source_path)
        .with_context(|| format!("could not read {}", file.source_path.display()))?;
    if content.len() as u64 != file.byte_length {
        bail!(
            "{} changed size while generating ({} bytes, expected {})",
            file.source_path.display(),
            content.len(),
            file.byte_length
        );
    }
    debug!(
        "embedding {} bytes from {} as resource {}",
        content.len(),
        file.source_path.display(),
        file.index
    );
    let array = byte_array(file.index, &content);
    out.write_all(array.text.as_bytes())?;
    Ok(())
}

fn write_file_accessors(
    out: &mut impl Write,
    catalog: &Catalog,
    reporter: &dyn ErrorReporting,
) -> Result<()> {
    for (signature, suffix) in [(GET_FILE_BUFFER, "Buffer"), (GET_FILE_SIZE, "Size")] {
        writeln!(out)?;
        writeln!(out, "    {signature}")?;
        writeln!(out, "    {{")?;
        writeln!(out, "      switch (id)")?;
        writeln!(out, "      {{")?;
        for file in catalog.files() {
            writeln!(out, "      case {}:", file.identifier)?;
            writeln!(out, "        return resource{}{suffix};", file.file.index)?;
        }
        writeln!(out)?;
        writeln!(out, "      default:")?;
        writeln!(out, "        throw {};", reporter.out_of_range())?;
        writeln!(out, "      }}")?;
        writeln!(out, "    }}")?;
    }
    Ok(())
}

fn write_directory_accessors(
    out: &mut impl Write,
    catalog: &Catalog,
    reporter: &dyn ErrorReporting,
) -> Result<()> {
    for (signature, suffix) in [(GET_DIRECTORY_BUFFER, "Buffer"), (GET_DIRECTORY_SIZE, "Size")] {
        writeln!(out)?;
        writeln!(out, "    {signature}")?;
        writeln!(out, "    {{")?;
        writeln!(out, "      switch (id)")?;
        writeln!(out, "      {{")?;
        for directory in catalog.directories() {
            writeln!(out, "      case {}:", directory.identifier)?;
            for entry in &directory.entries {
                writeln!(
                    out,
                    "        if (!strcmp(path, {}))",
                    c_string_literal(&entry.virtual_path)
                )?;
                writeln!(out, "          return resource{}{suffix};", entry.file.index)?;
            }
            writeln!(out, "        throw {};", reporter.inexistent_item())?;
            writeln!(out)?;
        }
        writeln!(out, "      default:")?;
        writeln!(out, "        throw {};", reporter.out_of_range())?;
        writeln!(out, "      }}")?;
        writeln!(out, "    }}")?;
    }
    Ok(())
}

fn write_list_resources(
    out: &mut impl Write,
    catalog: &Catalog,
    reporter: &dyn ErrorReporting,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "    {LIST_RESOURCES}")?;
    writeln!(out, "    {{")?;
    writeln!(out, "      result.clear();")?;
    writeln!(out)?;
    writeln!(out, "      switch (id)")?;
    writeln!(out, "      {{")?;
    for directory in catalog.directories() {
        writeln!(out, "      case {}:", directory.identifier)?;
        for path in directory.list() {
            writeln!(out, "        result.push_back({});", c_string_literal(path))?;
        }
        writeln!(out, "        break;")?;
        writeln!(out)?;
    }
    writeln!(out, "      default:")?;
    writeln!(out, "        throw {};", reporter.out_of_range())?;
    writeln!(out, "      }}")?;
    writeln!(out, "    }}")?;
    Ok(())
}

fn write_convenience_wrappers(out: &mut impl Write) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "    {GET_FILE}")?;
    writeln!(out, "    {{")?;
    writeln!(out, "      size_t size = GetFileResourceSize(id);")?;
    writeln!(out, "      result.resize(size);")?;
    writeln!(out, "      if (size > 0)")?;
    writeln!(out, "        memcpy(&result[0], GetFileResourceBuffer(id), size);")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    {GET_DIRECTORY}")?;
    writeln!(out, "    {{")?;
    writeln!(out, "      size_t size = GetDirectoryResourceSize(id, path);")?;
    writeln!(out, "      result.resize(size);")?;
    writeln!(out, "      if (size > 0)")?;
    writeln!(
        out,
        "        memcpy(&result[0], GetDirectoryResourceBuffer(id, path), size);"
    )?;
    writeln!(out, "    }}")?;
    Ok(())
}

/// Quotes `s` as a C string literal. Anything outside printable ASCII becomes
/// an octal escape so the literal holds exactly the UTF-8 bytes of `s`.
fn c_string_literal(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for byte in s.bytes() {
        match byte {
            b'"' => result.push_str("\\\""),
            b'\\' => result.push_str("\\\\"),
            // keeps "??" sequences from reading as trigraphs
            b'?' => result.push_str("\\?"),
            0x20..=0x7e => result.push(byte as char),
            _ => result.push_str(&format!("\\{byte:03o}")),
        }
    }
    result.push('"');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorMode, scan::scan};

    fn render(opts: &mut Options) -> Result<(String, String)> {
        let catalog = scan(opts)?;
        let mut header = vec![];
        write_declarations(&mut header, opts, &catalog)?;
        let mut source = vec![];
        write_definitions(&mut source, opts, &catalog, opts.reporter().as_ref())?;
        Ok((String::from_utf8(header)?, String::from_utf8(source)?))
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(c_string_literal("/a.txt"), "\"/a.txt\"");
        assert_eq!(c_string_literal("/q\"\\?.txt"), "\"/q\\\"\\\\\\?.txt\"");
        assert_eq!(c_string_literal("/é"), "\"/\\303\\251\"");
    }

    #[test]
    fn empty_catalog_has_empty_enums() -> Result<()> {
        let mut opts = Options::new("Resources").with_namespace("Only");
        let (header, source) = render(&mut opts)?;
        assert!(header.contains("    enum FileResourceId\n    {\n    };\n"));
        assert!(header.contains("    enum DirectoryResourceId\n    {\n    };\n"));
        assert!(source.starts_with("#include \"Resources.h\"\n#include <OrthancException.h>\n"));
        assert_eq!(source.matches("default:").count(), 5);
        Ok(())
    }

    #[test]
    fn namespaces_open_and_close_in_both_artifacts() -> Result<()> {
        let mut opts = Options::new("Resources").with_namespace("Outer.Middle.Inner");
        let (header, source) = render(&mut opts)?;
        for text in [&header, &source] {
            let outer = text.find("namespace Outer {").expect("outer");
            let middle = text.find("namespace Middle {").expect("middle");
            let inner = text.find("namespace Inner {").expect("inner");
            assert!(outer < middle && middle < inner);
            assert!(text.ends_with("}\n}\n}\n"));
        }
        Ok(())
    }

    #[test]
    fn accessors_dispatch_on_catalog_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("second.txt"), b"22")?;
        fs::write(dir.path().join("first.txt"), b"1")?;
        fs::create_dir_all(dir.path().join("web/b"))?;
        fs::write(dir.path().join("web/b/c.txt"), b"c")?;
        fs::write(dir.path().join("web/a.txt"), b"a")?;

        let mut opts = Options::new("Resources")
            .with_error_mode(ErrorMode::System)
            .with_resource("second", dir.path().join("second.txt"))
            .with_resource("web", dir.path().join("web"))
            .with_resource("first", dir.path().join("first.txt"));
        let (header, source) = render(&mut opts)?;

        assert!(
            header.contains("    enum FileResourceId\n    {\n      SECOND,\n      FIRST\n    };")
        );
        assert!(header.contains("    enum DirectoryResourceId\n    {\n      WEB\n    };"));
        for signature in [
            GET_FILE_BUFFER,
            GET_FILE_SIZE,
            GET_FILE,
            GET_DIRECTORY_BUFFER,
            GET_DIRECTORY_SIZE,
            GET_DIRECTORY,
            LIST_RESOURCES,
        ] {
            assert!(header.contains(&format!("    {signature};\n")));
            assert!(source.contains(&format!("    {signature}\n    {{\n")));
        }

        assert!(source.contains("#include <stdexcept>"));
        assert!(source.contains("      case SECOND:\n        return resource0Size;\n"));
        assert!(source.contains("      case FIRST:\n        return resource3Buffer;\n"));
        assert!(source.contains(
            "      case WEB:\n        if (!strcmp(path, \"/a.txt\"))\n          \
             return resource1Size;\n        \
             if (!strcmp(path, \"/b/c.txt\"))\n          return resource2Size;\n        \
             throw ::std::runtime_error(\"Unknown path in a directory resource\");\n"
        ));
        assert!(source.contains(
            "      case WEB:\n        result.push_back(\"/a.txt\");\n        \
             result.push_back(\"/b/c.txt\");\n        break;\n"
        ));
        assert_eq!(
            source
                .matches("throw ::std::runtime_error(\"Parameter out of range\");")
                .count(),
            5
        );

        let buffers: Vec<_> = (0..4)
            .map(|i| source.find(&format!("resource{i}Buffer[]")).expect("buffer"))
            .collect();
        assert!(buffers.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }
}
