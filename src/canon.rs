//! Path canonicalization.
//!
//! Paths from manifests and the command line are compared textually, so
//! "foo/./bar" and "foo//bar" must normalize to the same string as "foo/bar".
//! Canonicalization is purely lexical and never consults the filesystem.

use anyhow::bail;

#[cfg(windows)]
const SEP: char = '\\';
#[cfg(not(windows))]
const SEP: char = '/';

/// Lexically canonicalize a path: collapse repeated separators and resolve
/// "." and ".." components.  ".." never reaches above the root of an
/// absolute path; relative paths keep leading ".." components.  An empty
/// path is an error.
pub fn canon_path(path: &str) -> anyhow::Result<String> {
    if path.is_empty() {
        bail!("empty path");
    }

    let absolute = path.starts_with(['/', '\\']);
    let mut components: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                _ if absolute => {}
                _ => components.push(".."),
            },
            _ => components.push(component),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push(SEP);
    }
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            out.push(SEP);
        }
        out.push_str(component);
    }
    if out.is_empty() {
        out.push('.');
    }
    Ok(out)
}
