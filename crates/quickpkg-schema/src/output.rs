use crate::metadata::AppMetadata;
use std::path::{Path, PathBuf};

/// File name used when no output is given or the output is a directory.
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{name}-{version}.pkg";

const PACKAGE_SUFFIX: &str = ".pkg";

/// Substitute `{name}`, `{version}` and `{identifier}` in `template`.
///
/// Spaces are removed from the name so the result stays shell friendly.
pub fn render_template(template: &str, metadata: &AppMetadata) -> String {
    let name = metadata.name.replace(' ', "");
    template
        .replace("{name}", &name)
        .replace("{version}", &metadata.version)
        .replace("{identifier}", &metadata.identifier)
}

/// Compute the final package path from an optional user-supplied output.
///
/// An existing directory receives the default file name inside it. The
/// result always ends in `.pkg`.
pub fn resolve_output_path(output: Option<&Path>, metadata: &AppMetadata) -> PathBuf {
    let template = match output {
        Some(dir) if dir.is_dir() => dir.join(DEFAULT_OUTPUT_TEMPLATE),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_OUTPUT_TEMPLATE),
    };

    let mut rendered = render_template(&template.to_string_lossy(), metadata);
    if !rendered.ends_with(PACKAGE_SUFFIX) {
        rendered.push_str(PACKAGE_SUFFIX);
    }
    PathBuf::from(rendered)
}
