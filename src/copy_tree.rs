use std::fs;
use std::path::{Path, PathBuf};

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "vendor",
    "node_modules",
    ".gooze-reports",
    ".gooze.log",
];

/// Find the project root by walking up from the source file. `go.mod` is
/// the authoritative marker; a bare `.git` directory is accepted as a
/// fallback, and failing both the file's own directory is used.
pub fn find_project_root(source_file: &Path) -> PathBuf {
    let markers = &["go.mod", ".git"];
    let fallback = source_file.parent().unwrap_or(source_file).to_path_buf();

    for marker in markers {
        let mut dir = fallback.as_path();
        loop {
            if dir.join(marker).exists() {
                return dir.to_path_buf();
            }
            match dir.parent() {
                Some(parent) if parent != dir => dir = parent,
                _ => break,
            }
        }
    }

    fallback
}

/// Copy the project tree into `dest_root`, skipping version-control and
/// dependency directories. Symlinks and other special files are not copied.
pub fn copy_project(project_root: &Path, dest_root: &Path) -> std::io::Result<()> {
    copy_dir_filtered(project_root, dest_root)
}

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name)
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if should_skip(&name_str) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_dir_filtered(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copy_project_copies_files_and_skips_git() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::write(src.join("app.go"), "package app").unwrap();
        fs::write(src.join("app_test.go"), "package app").unwrap();
        fs::create_dir(src.join(".git")).unwrap();
        fs::write(src.join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir(src.join("vendor")).unwrap();
        fs::write(src.join("vendor").join("dep.go"), "package dep").unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_project(src, dst_dir.path()).unwrap();

        assert!(dst_dir.path().join("app.go").exists());
        assert!(dst_dir.path().join("app_test.go").exists());
        assert!(!dst_dir.path().join(".git").exists());
        assert!(!dst_dir.path().join("vendor").exists());
    }

    #[test]
    fn copy_project_preserves_nested_structure() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::create_dir_all(src.join("internal").join("util")).unwrap();
        fs::write(
            src.join("internal").join("util").join("math.go"),
            "package util",
        )
        .unwrap();
        fs::write(src.join("go.mod"), "module example.com/app").unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_project(src, dst_dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst_dir.path().join("internal").join("util").join("math.go"))
                .unwrap(),
            "package util"
        );
        assert!(dst_dir.path().join("go.mod").exists());
    }

    #[test]
    fn find_project_root_finds_go_mod() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("go.mod"), "module example.com/app").unwrap();
        fs::write(root.join("pkg").join("lib.go"), "package lib").unwrap();

        let found = find_project_root(&root.join("pkg").join("lib.go"));
        assert_eq!(found, root);
    }

    #[test]
    fn find_project_root_prefers_go_mod_over_git() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("go.mod"), "module example.com/sub").unwrap();
        fs::write(root.join("sub").join("main.go"), "package main").unwrap();

        let found = find_project_root(&root.join("sub").join("main.go"));
        assert_eq!(found, root.join("sub"));
    }

    #[test]
    fn find_project_root_fallback_to_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src").join("app.go"), "package app").unwrap();

        let found = find_project_root(&root.join("src").join("app.go"));
        assert_eq!(found, root.join("src"));
    }

    #[test]
    fn should_skip_filters_correctly() {
        assert!(should_skip(".git"));
        assert!(should_skip("vendor"));
        assert!(should_skip("node_modules"));
        assert!(should_skip(".gooze-reports"));
        assert!(!should_skip("app.go"));
        assert!(!should_skip("internal"));
        assert!(!should_skip("go.mod"));
    }
}
