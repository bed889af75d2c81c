#![allow(dead_code)]

use jobjar::packager::{load_lock, NativeBundlingTable, RuntimeDistribution};
use jobjar::{JobRegistry, PackageConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[path = "../../../../demos/test_project/word_count.rs"]
pub mod word_count;

#[path = "../../../../demos/test_project/uniques.rs"]
pub mod uniques;

pub const LIBRARIES: &[(&str, &str)] = &[("paint", "2.0.1"), ("json", "1.8.6"), ("jruby-openssl", "0.9.21")];

pub fn registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    word_count::register(&mut registry);
    uniques::register(&mut registry);
    registry
}

pub fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
    let path = path.as_ref();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

pub struct Scenario {
    pub dir: TempDir,
    pub config: PackageConfig,
}

impl Scenario {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// The test project with one real dependency (`paint`) plus the two
/// libraries newer runtimes ship themselves.
pub fn scenario(runtime_version: &str) -> Scenario {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let project = root.join("test_project");
    write(project.join("test_project.toml"), include_str!("../../../../demos/test_project/test_project.toml"));
    write(project.join("word_count.rs"), include_str!("../../../../demos/test_project/word_count.rs"));
    write(project.join("uniques.rs"), include_str!("../../../../demos/test_project/uniques.rs"));
    write(project.join("build/stale.txt"), "stale");
    write(project.join("target/release/junk"), "junk");
    write(project.join(".git/HEAD"), "ref: refs/heads/main");

    let mut lock = String::new();
    for (name, version) in LIBRARIES {
        let lib_root = format!("vendor/{}-{}", name, version);
        write(root.join(&lib_root).join("lib").join(format!("{}.txt", name)), *name);
        lock.push_str(&format!(
            "[[library]]\nname = \"{}\"\nversion = \"{}\"\nroot = \"{}\"\n\n",
            name, version, lib_root
        ));
    }
    write(root.join("jobjar.lock"), lock);

    let runtime_path = root.join(format!("dist/script-runtime-{}.jar", runtime_version));
    write(&runtime_path, "runtime");
    let ext = root.join("dist/test_project_ext.jar");
    write(&ext, "ext");
    let entry_point = root.join("bin/test_project");
    write(&entry_point, "#!/bin/sh\nexit 0\n");
    make_executable(&entry_point);

    let config = PackageConfig {
        project_name: "test_project".to_string(),
        project_root: project.clone(),
        build_dir: project.join("build"),
        include: Vec::new(),
        exclude: Vec::new(),
        libraries: load_lock(&root.join("jobjar.lock")).unwrap(),
        support_root: None,
        runtime: RuntimeDistribution {
            name: "script-runtime".to_string(),
            version: runtime_version.to_string(),
            path: runtime_path,
        },
        extra_archives: vec![ext],
        entry_point,
        bundling: NativeBundlingTable::default(),
        artifact_name: None,
    };
    Scenario { dir, config }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) {}

/// One line per occurrence of `alice` (770 in total) and `anything` on the
/// first 21 of them.
pub fn word_count_input(input: &Path) {
    let mut text = String::new();
    for i in 0..770 {
        text.push_str("Alice sat by her sister on the bank");
        if i < 21 {
            text.push_str(", having nothing to do, not anything");
        }
        text.push('\n');
    }
    write(input.join("alice/alice.txt"), text);
}

pub const UNIQUES: &[(char, usize)] = &[('a', 185), ('e', 128), ('b', 40)];

/// Distinct words per letter as in [`UNIQUES`], each word repeated one to
/// three times and scattered over the lines.
pub fn uniques_input(input: &Path) {
    let mut words = Vec::new();
    for round in 0..3 {
        for (letter, n) in UNIQUES {
            for i in 0..*n {
                if round <= i % 3 {
                    words.push(format!("{}{}", letter, i));
                }
            }
        }
    }
    let lines: Vec<String> = words.chunks(10).map(|c| c.join(" ")).collect();
    write(input.join("words/words.txt"), lines.join("\n") + "\n");
}

/// `key<TAB>value` lines of every part file in `dir`.
pub fn read_output(dir: &Path) -> Vec<(String, i64)> {
    let mut parts: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("part-r-"))
        .collect();
    parts.sort();
    let mut out = Vec::new();
    for part in parts {
        for line in fs::read_to_string(part).unwrap().lines() {
            let (k, v) = line.split_once('\t').unwrap();
            out.push((k.to_string(), v.parse().unwrap()));
        }
    }
    out
}

pub fn lookup(output: &[(String, i64)], key: &str) -> Option<i64> {
    output.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
}
