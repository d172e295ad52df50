//! Filename decomposition for the `$F` macro function family.
//!
//! The letters between `$F` and the paren pick which path components the
//! result keeps. The value decomposes into directory part, base name and
//! extension; the selected components form a contiguous span, so `$Fdx`
//! keeps everything from the last directory through the extension.
//!
//! - `p` full directory path, `d` last directory component (each extra `d`
//!   keeps one more), both with a trailing separator
//! - `n` base name, `x` extension including its dot
//! - `f` absolutize a relative path against the caller's cwd first
//! - `b` bare: drop the trailing separator of a directory result, or the
//!   dot of an extension-only result
//! - `q` quote the result (`a`: single quotes instead of double)
//! - `u` / `w` convert separators to unix / windows style
//!
//! Bare-filename inputs have no directory part, so `d`/`p` select nothing.

pub(crate) fn is_file_flag(c: u8) -> bool {
    matches!(
        c,
        b'd' | b'p' | b'n' | b'x' | b'f' | b'b' | b'q' | b'a' | b'u' | b'w'
    )
}

/// Parsed `$F` flag letters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFlags {
    /// Number of trailing directory components to keep (count of `d`).
    pub dirs: u32,
    pub path: bool,
    pub name: bool,
    pub ext: bool,
    pub full: bool,
    pub bare: bool,
    pub quote: bool,
    pub alt_quote: bool,
    pub to_unix: bool,
    pub to_windows: bool,
}

impl FileFlags {
    pub fn parse(flags: &str) -> Option<Self> {
        let mut out = FileFlags::default();
        for c in flags.bytes() {
            match c {
                b'd' => out.dirs += 1,
                b'p' => out.path = true,
                b'n' => out.name = true,
                b'x' => out.ext = true,
                b'f' => out.full = true,
                b'b' => out.bare = true,
                b'q' => out.quote = true,
                b'a' => out.alt_quote = true,
                b'u' => out.to_unix = true,
                b'w' => out.to_windows = true,
                _ => return None,
            }
        }
        Some(out)
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// A path is absolute if it starts with a separator or its first segment
/// carries a `:` (drive letter or URL scheme).
fn is_relative(path: &str) -> bool {
    if path.starts_with(is_separator) {
        return false;
    }
    if let Some(colon) = path.find(':') {
        if !path[..colon].contains(is_separator) {
            return false;
        }
    }
    true
}

/// Keep the last `count` directory components of `dirpart` (which ends in a
/// separator). More `d`s than components keeps the whole directory part,
/// leading root included.
fn last_dirs(dirpart: &str, count: u32) -> &str {
    if dirpart.is_empty() {
        return dirpart;
    }
    let trimmed = &dirpart[..dirpart.len() - 1];
    let mut starts = Vec::new();
    let mut prev_sep = true;
    for (i, c) in trimmed.char_indices() {
        if is_separator(c) {
            prev_sep = true;
        } else {
            if prev_sep {
                starts.push(i);
            }
            prev_sep = false;
        }
    }
    if count as usize >= starts.len() {
        return dirpart;
    }
    &dirpart[starts[starts.len() - count as usize]..]
}

/// Decompose `value` according to `flags`. The input has already been
/// scope-resolved and fully expanded by the caller.
pub(crate) fn decompose(value: &str, flags: &FileFlags, cwd: &str) -> String {
    let mut text = value.trim().to_string();

    // Strip one layer of matching quotes.
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        text = text[1..text.len() - 1].to_string();
    }

    if flags.full && !cwd.is_empty() && is_relative(&text) {
        let tail = text
            .strip_prefix("./")
            .or_else(|| text.strip_prefix(".\\"))
            .unwrap_or(&text);
        text = format!("{}/{}", cwd.trim_end_matches(is_separator), tail);
    }

    let (dirpart, filename) = match text.rfind(is_separator) {
        Some(i) => text.split_at(i + 1),
        None => ("", text.as_str()),
    };
    let (base, ext) = match filename.rfind('.') {
        Some(i) => filename.split_at(i),
        None => (filename, ""),
    };

    let has_dir = flags.dirs > 0 || flags.path;
    let any_part = has_dir || flags.name || flags.ext;

    let mut result = if !any_part {
        format!("{dirpart}{filename}")
    } else {
        // Selected components form a contiguous span, so a directory flag
        // combined with `x` keeps the base name between them.
        let include_name = flags.name || (has_dir && flags.ext);
        let mut s = String::new();
        if has_dir {
            if flags.dirs > 0 {
                s.push_str(last_dirs(dirpart, flags.dirs));
            } else {
                s.push_str(dirpart);
            }
        }
        if include_name {
            s.push_str(base);
        }
        if flags.ext {
            s.push_str(ext);
        }
        s
    };

    if flags.bare {
        if has_dir && !flags.name && !flags.ext {
            while result.ends_with(is_separator) {
                result.pop();
            }
        } else if !has_dir && !flags.name && flags.ext {
            if let Some(stripped) = result.strip_prefix('.') {
                result = stripped.to_string();
            }
        }
    }

    if flags.to_windows {
        result = result.replace('/', "\\");
    } else if flags.to_unix {
        result = result.replace('\\', "/");
    }

    if flags.quote {
        result = if flags.alt_quote {
            format!("'{result}'")
        } else {
            format!("\"{result}\"")
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(flags: &str, value: &str) -> String {
        let flags = FileFlags::parse(flags).unwrap();
        decompose(value, &flags, "/home/testing")
    }

    #[test]
    fn test_bare_filename_ignores_dir_flags() {
        assert_eq!(expand("n", "base"), "base");
        assert_eq!(expand("x", "base"), "");
        assert_eq!(expand("d", "base"), "");
        assert_eq!(expand("p", "Now is the time for all good men."), "");
    }

    #[test]
    fn test_full_flag_absolutizes() {
        assert_eq!(expand("df", "base"), "testing/");
        assert_eq!(expand("pf", "base"), "/home/testing/");
        assert_eq!(expand("f", "./here"), "/home/testing/here");
        assert_eq!(expand("f", "../file"), "/home/testing/../file");
        assert_eq!(expand("f", "a/b/c/d/e/f.x"), "/home/testing/a/b/c/d/e/f.x");
        // Already-absolute inputs are untouched.
        assert_eq!(expand("f", "/one/two/three.for"), "/one/two/three.for");
    }

    #[test]
    fn test_directory_selection() {
        assert_eq!(expand("d", "/dur/der"), "dur/");
        assert_eq!(expand("dx", "/dur/der"), "dur/der");
        assert_eq!(expand("n", "/dur/der"), "der");
        assert_eq!(expand("pnx", "/dur/der"), "/dur/der");
        assert_eq!(expand("d", "/one/two/three.for"), "two/");
        assert_eq!(expand("p", "/one/two/three.for"), "/one/two/");
        assert_eq!(expand("dnx", "/one/two/three.for"), "two/three.for");
    }

    #[test]
    fn test_repeated_d_keeps_more_components() {
        let deep = "/six/five/four/three/two/one/file.ext";
        assert_eq!(expand("d", deep), "one/");
        assert_eq!(expand("dd", deep), "two/one/");
        assert_eq!(expand("ddd", deep), "three/two/one/");
        assert_eq!(expand("ddddddd", deep), "/six/five/four/three/two/one/");
        assert_eq!(expand("ddb", deep), "two/one");
    }

    #[test]
    fn test_name_and_extension() {
        assert_eq!(expand("n", "simple.dat"), "simple");
        assert_eq!(expand("x", "simple.dat"), ".dat");
        assert_eq!(expand("nx", "simple.dat"), "simple.dat");
        assert_eq!(expand("dnx", "simple.dat"), "simple.dat");
        // A trailing dot is an empty extension, still with its dot.
        let long = "Now is the time for all good men.";
        assert_eq!(expand("n", long), "Now is the time for all good men");
        assert_eq!(expand("x", long), ".");
        assert_eq!(expand("nx", long), long);
    }

    #[test]
    fn test_bare_strips_separator_and_dot() {
        assert_eq!(expand("db", "/dur/der/base.ex"), "der");
        assert_eq!(expand("pb", "\"/one/two/three.for\""), "/one/two");
        assert_eq!(expand("xb", "\"/one/two/three.for\""), "for");
        assert_eq!(expand("nb", "\"/one/two/three.for\""), "three");
    }

    #[test]
    fn test_quoted_inputs_are_unquoted_first() {
        assert_eq!(expand("dnx", "\"/one/two/three.for\""), "two/three.for");
        assert_eq!(expand("n", "'/one/two/three.for'"), "three");
        assert_eq!(expand("qn", "'/one/two/three.for'"), "\"three\"");
        assert_eq!(expand("qan", "'/one/two/three.for'"), "'three'");
        assert_eq!(expand("dnx", "\"ein/zw ei/dr ei.fir\""), "zw ei/dr ei.fir");
    }

    #[test]
    fn test_quote_flags() {
        assert_eq!(expand("q", "/one/two/three.for"), "\"/one/two/three.for\"");
        assert_eq!(expand("qa", "/one/two/three.for"), "'/one/two/three.for'");
        assert_eq!(expand("qpnx", "file:/one/two/three.for"), "\"file:/one/two/three.for\"");
    }

    #[test]
    fn test_url_keeps_scheme_in_path() {
        let url = "file:/one/two/three.for";
        assert_eq!(expand("d", url), "two/");
        assert_eq!(expand("p", url), "file:/one/two/");
        assert_eq!(expand("n", url), "three");
        assert_eq!(expand("x", url), ".for");
    }

    #[test]
    fn test_relative_paths() {
        assert_eq!(expand("d", "ein/zwei/drei.fir"), "zwei/");
        assert_eq!(expand("p", "ein/zwei/drei.fir"), "ein/zwei/");
        assert_eq!(expand("pnx", "ein/zwei/drei.fir"), "ein/zwei/drei.fir");
        assert_eq!(expand("d", "./here"), "./");
        assert_eq!(expand("p", "./here"), "./");
        assert_eq!(expand("n", "./here"), "here");
        assert_eq!(expand("x", "./here"), "");
        assert_eq!(expand("d", "../peer/file.dat"), "peer/");
        assert_eq!(expand("p", "../peer/file.dat"), "../peer/");
        assert_eq!(expand("dnx", "../peer/file.dat"), "peer/file.dat");
    }

    #[test]
    fn test_separator_conversion() {
        assert_eq!(expand("pw", "/dur/der/base.ex"), "\\dur\\der\\");
        assert_eq!(
            expand("w", "/six/five/four/three/two/one/file.ext"),
            "\\six\\five\\four\\three\\two\\one\\file.ext"
        );
        assert_eq!(expand("fu", "..\\file"), "/home/testing/../file");
        assert_eq!(expand("fw", "..\\file"), "\\home\\testing\\..\\file");
        assert_eq!(expand("fqaw", "/dur/der/base.ex"), "'\\dur\\der\\base.ex'");
    }

    #[test]
    fn test_deep_relative_with_full() {
        let rel = "a/b/c/d/e/f.x";
        assert_eq!(expand("fddddd", rel), "a/b/c/d/e/");
        assert_eq!(expand("fdddddd", rel), "testing/a/b/c/d/e/");
        assert_eq!(expand("fq", rel), "\"/home/testing/a/b/c/d/e/f.x\"");
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(FileFlags::parse("z").is_none());
        assert!(FileFlags::parse("nz").is_none());
        assert!(FileFlags::parse("").is_some());
    }
}
