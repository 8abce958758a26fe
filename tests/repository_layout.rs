//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Repository layout and sample configuration checks."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use enerpulse_common::{AppConfig, PollutionMetric, TransportConfig};

fn root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("failed to list {}: {}", dir.display(), err));
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs")
            || path.file_name().is_some_and(|name| name == "Cargo.toml")
        {
            out.push(path);
        }
    }
}

#[test]
fn sources_and_manifests_carry_frontmatter() {
    let mut files = vec![root().join("Cargo.toml")];
    for dir in ["crates", "bin", "tests"] {
        collect(&root().join(dir), &mut files);
    }
    assert!(files.len() > 20, "expected workspace sources, found {}", files.len());

    for file in files {
        let content = fs::read_to_string(&file).unwrap();
        let marker = if file.extension().is_some_and(|ext| ext == "rs") {
            "//! ---"
        } else {
            "# ---"
        };
        assert!(
            content.starts_with(marker),
            "{} must include frontmatter header",
            file.display()
        );
        assert!(
            content.contains("ems_description"),
            "{} missing ems_description",
            file.display()
        );
    }
}

#[test]
fn example_config_matches_defaults() {
    let config = AppConfig::from_path(&root().join("configs/enerpulse.example.toml")).unwrap();
    let defaults = AppConfig::default();

    assert_eq!(config.series.start_hour, defaults.series.start_hour);
    assert_eq!(config.series.end_hour, defaults.series.end_hour);
    assert_eq!(config.series.metric, PollutionMetric::CarbonIntensity);
    assert_eq!(config.stream.tick_interval, defaults.stream.tick_interval);
    assert_eq!(config.stream.history_capacity, defaults.stream.history_capacity);
    assert_eq!(
        config.stream.reconnect.max_attempts,
        defaults.stream.reconnect.max_attempts
    );
    assert_eq!(config.stream.reconnect.backoff, defaults.stream.reconnect.backoff);
    assert_eq!(config.stream.transport, TransportConfig::Simulated);
    assert_eq!(config.simulator.base_load_kw, defaults.simulator.base_load_kw);
    assert_eq!(config.metrics.listen, defaults.metrics.listen);
    assert!(!config.logging.file_enabled);
}

/// Crate names listed under `[dependencies]` in a member manifest.
fn runtime_dependencies(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .skip_while(|line| line.trim() != "[dependencies]")
        .skip(1)
        .take_while(|line| !line.starts_with('['))
        .filter_map(|line| {
            let name = line.split(['.', ' ', '=']).next()?.trim();
            (!name.is_empty() && !name.starts_with('#')).then(|| name.to_string())
        })
        .collect()
}

#[test]
fn member_dependencies_are_referenced_in_sources() {
    for dir in ["crates", "bin"] {
        for entry in fs::read_dir(root().join(dir)).unwrap() {
            let member = entry.unwrap().path();
            let manifest = fs::read_to_string(member.join("Cargo.toml")).unwrap();
            let mut sources = Vec::new();
            collect(&member.join("src"), &mut sources);
            let text: String = sources
                .iter()
                .map(|path| fs::read_to_string(path).unwrap())
                .collect();

            for dependency in runtime_dependencies(&manifest) {
                let path = format!("{}::", dependency.replace('-', "_"));
                assert!(
                    text.contains(&path),
                    "{} declares {} but never uses it",
                    member.display(),
                    dependency
                );
            }
        }
    }
}

#[test]
fn serde_with_carries_no_chrono_adapters() {
    let manifest = fs::read_to_string(root().join("Cargo.toml")).unwrap();
    let line = manifest
        .lines()
        .find(|line| line.starts_with("serde_with"))
        .unwrap();
    assert!(!line.contains("chrono"), "unexpected serde_with features: {line}");
}

#[test]
fn frontmatter_versions_agree() {
    let mut files = vec![root().join("Cargo.toml")];
    for dir in ["crates", "bin", "tests"] {
        collect(&root().join(dir), &mut files);
    }
    for file in files {
        let content = fs::read_to_string(&file).unwrap();
        let version = content
            .lines()
            .find(|line| line.contains("ems_version:"))
            .unwrap_or_else(|| panic!("{} missing ems_version", file.display()));
        assert!(
            version.ends_with("ems_version: \"v0.1.0\""),
            "{} has {}",
            file.display(),
            version
        );
    }
}
