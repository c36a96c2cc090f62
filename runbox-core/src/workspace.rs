use std::path::Component;
use std::path::Path;

use crate::error::Result;
use crate::error::RunboxErr;
use crate::types::MAIN_FILE;
use crate::types::STDIN_FILE;
use crate::types::Workspace;

/// Characters forbidden anywhere in a user-supplied filename (spec §3
/// invariant: "none of the characters `< > : " | ? *`").
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Reject path-traversal components, absolute paths, and the forbidden
/// character set before a single byte of the file is written. This mirrors
/// the teacher's `is_write_patch_constrained_to_writable_paths` normalization
/// (`core/src/safety.rs`) but inverted: rather than checking a path lands
/// inside a writable root, it rejects any path that could ever escape one.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RunboxErr::UnsafeFile(name.to_string(), "empty filename".into()));
    }
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(RunboxErr::UnsafeFile(
            name.to_string(),
            "absolute paths are not allowed".into(),
        ));
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(RunboxErr::UnsafeFile(
            name.to_string(),
            "path traversal is not allowed".into(),
        ));
    }
    if let Some(bad) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(RunboxErr::UnsafeFile(
            name.to_string(),
            format!("filename contains forbidden character '{bad}'"),
        ));
    }
    Ok(())
}

/// Build a fresh [`Workspace`], write the wrapped program as `main.py`,
/// optionally write `stdin` to `input.txt`, and write every user-supplied
/// file after validating its name and size. Any rejection aborts before any
/// container or subprocess is ever launched (spec §3, §7 item 3).
pub fn prepare(
    wrapped_program: &str,
    stdin: &str,
    files: &std::collections::HashMap<String, Vec<u8>>,
    max_file_size: u64,
) -> Result<Workspace> {
    let workspace = Workspace::create().map_err(RunboxErr::Io)?;

    std::fs::write(workspace.join(MAIN_FILE), wrapped_program).map_err(RunboxErr::Io)?;

    if !stdin.is_empty() {
        std::fs::write(workspace.join(STDIN_FILE), stdin).map_err(RunboxErr::Io)?;
    }

    for (name, contents) in files {
        validate_filename(name)?;
        if contents.len() as u64 > max_file_size {
            return Err(RunboxErr::UnsafeFile(
                name.clone(),
                format!(
                    "file exceeds max_file_size ({} > {max_file_size} bytes)",
                    contents.len()
                ),
            ));
        }
        let dest = workspace.join(name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(RunboxErr::Io)?;
        }
        std::fs::write(&dest, contents).map_err(RunboxErr::Io)?;
    }

    Ok(workspace)
}

/// Enumerate files created in `root` by user code, excluding the wrapper
/// artifacts and anything exceeding `max_file_size` (spec §4.3 step 7).
pub fn enumerate_output_files(root: &Path, max_file_size: u64) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return out;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == MAIN_FILE || name == STDIN_FILE {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.len() > max_file_size {
            continue;
        }
        out.push(name);
    }
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_filename("../escape.txt").is_err());
        assert!(validate_filename("a/../../b.txt").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_filename("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_forbidden_characters() {
        for bad in ["a<b", "a>b", "a:b", "a\"b", "a|b", "a?b", "a*b"] {
            assert!(validate_filename(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn accepts_nested_safe_path() {
        assert!(validate_filename("data/sample.csv").is_ok());
        assert!(validate_filename("main.py").is_ok());
    }

    #[test]
    fn prepare_rejects_unsafe_file_before_writing_anything() {
        let mut files = HashMap::new();
        files.insert("../escape.txt".to_string(), b"x".to_vec());
        let result = prepare("print(1)", "", &files, 1024);
        assert!(result.is_err());
    }

    #[test]
    fn prepare_rejects_oversize_file() {
        let mut files = HashMap::new();
        files.insert("big.txt".to_string(), vec![0u8; 10]);
        let result = prepare("print(1)", "", &files, 5);
        assert!(result.is_err());
    }

    #[test]
    fn enumerate_excludes_wrapper_artifacts() {
        let files = HashMap::new();
        let workspace = prepare("print(1)", "hello", &files, 1024).expect("prepare");
        std::fs::write(workspace.join("output.txt"), b"result").expect("write");
        let found = enumerate_output_files(workspace.path(), 1024);
        assert_eq!(found, vec!["output.txt".to_string()]);
    }
}
