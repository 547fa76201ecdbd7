//! Pure predicate deciding which repository paths are worth indexing.

use std::path::Path;

/// Exact basenames to index (build and orchestration files without a
/// meaningful extension). Matched case-sensitively.
const INDEXABLE_FILENAMES: &[&str] = &[
    "Dockerfile",
    "Makefile",
    "CMakeLists.txt",
    "pom.xml",
    "build.gradle",
    "docker-compose.yml",
];

/// File extensions to index, compared after lowercasing the suffix.
const INDEXABLE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "java", "go", "rs", "cpp", "c", "h", "rb", "php", "swift",
    "kt", "graphql", "json", "yaml", "yml", "toml", "ini", "md", "rst", "adoc", "txt", "html",
    "sql", "sh", "bash", "ps1", "css",
];

/// CI path markers, matched as case-sensitive substrings of the full path.
const INDEXABLE_PATH_MARKERS: &[&str] = &[".github/workflows/", ".gitlab-ci.yml"];

/// Decide whether a repository-relative path should be indexed.
/// Total over all string inputs; no I/O.
pub fn should_index(path: &str) -> bool {
    let p = Path::new(path);

    if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
        if INDEXABLE_FILENAMES.contains(&name) {
            return true;
        }
    }

    if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_lowercase();
        if INDEXABLE_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    INDEXABLE_PATH_MARKERS
        .iter()
        .any(|marker| path.contains(marker))
}
