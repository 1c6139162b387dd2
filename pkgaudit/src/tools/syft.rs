use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{SbomGenerator, ToolError, run_json};

/// A CycloneDX SBOM produced for the downloaded artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sbom {
    #[serde(skip)]
    pub raw: Value,
    pub path: Option<PathBuf>,
}

/// Run Syft against a file or directory and return the CycloneDX document.
pub async fn generate_sbom(
    program: &str,
    target: &Path,
    timeout: Duration,
) -> Result<Value, ToolError> {
    let scheme = if target.is_dir() { "dir" } else { "file" };
    let args = vec![
        format!("{scheme}:{}", target.display()),
        "-o".to_string(),
        "cyclonedx-json".to_string(),
    ];
    run_json("syft", program, &args, timeout).await
}

/// The `syft` binary.
#[derive(Debug, Clone)]
pub struct Syft {
    program: String,
    timeout: Duration,
}

impl Syft {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SbomGenerator for Syft {
    async fn generate(&self, target: &Path) -> Result<Value, ToolError> {
        generate_sbom(&self.program, target, self.timeout).await
    }
}

/// Shape of the dependency graph described by an SBOM.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SbomSummary {
    pub total_components: usize,
    pub max_depth: usize,
    pub direct_dependencies: usize,
    pub transitive_dependencies: usize,
    pub root_components: usize,
    pub component_types: BTreeMap<String, usize>,
    pub unique_licenses: usize,
}

/// Summarize a CycloneDX SBOM.
///
/// When the document carries no `dependencies` graph, `declared_dependencies`
/// (taken from registry metadata) stands in for the direct dependency count.
pub fn summarize(sbom: &Value, declared_dependencies: usize) -> SbomSummary {
    let empty = Vec::new();
    let components = sbom["components"].as_array().unwrap_or(&empty);
    let dependencies = sbom["dependencies"].as_array().unwrap_or(&empty);

    let mut component_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut licenses: BTreeSet<String> = BTreeSet::new();
    for component in components {
        let kind = component["type"].as_str().unwrap_or("unknown").to_string();
        *component_types.entry(kind).or_default() += 1;
        for entry in component["licenses"].as_array().unwrap_or(&empty) {
            let license = entry["license"]["id"]
                .as_str()
                .or_else(|| entry["license"]["name"].as_str())
                .or_else(|| entry["expression"].as_str())
                .or_else(|| entry.as_str());
            if let Some(license) = license {
                licenses.insert(license.to_string());
            }
        }
    }

    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut all_refs: BTreeSet<&str> = BTreeSet::new();
    let mut children: HashSet<&str> = HashSet::new();
    for dep in dependencies {
        let Some(parent) = dep["ref"].as_str() else {
            continue;
        };
        all_refs.insert(parent);
        for child in dep["dependsOn"].as_array().unwrap_or(&empty) {
            if let Some(child) = child.as_str() {
                graph.entry(parent).or_default().push(child);
                children.insert(child);
                all_refs.insert(child);
            }
        }
    }

    let mut roots: Vec<&str> = all_refs
        .iter()
        .copied()
        .filter(|r| !children.contains(r))
        .collect();

    let mut summary = SbomSummary {
        total_components: components.len(),
        component_types,
        unique_licenses: licenses.len(),
        ..Default::default()
    };

    if dependencies.is_empty() {
        roots.extend(components.iter().filter_map(|c| {
            let kind = c["type"].as_str().unwrap_or_default();
            matches!(kind, "library" | "application" | "framework")
                .then(|| c["bom-ref"].as_str())
                .flatten()
        }));
        summary.root_components = roots.len();
        if declared_dependencies > 0 {
            summary.direct_dependencies = declared_dependencies;
            summary.max_depth = 1;
        }
        return summary;
    }

    let mut direct: HashSet<&str> = HashSet::new();
    let mut transitive: HashSet<&str> = HashSet::new();
    for root in &roots {
        let (depth, root_direct, root_transitive) = walk(&graph, root);
        summary.max_depth = summary.max_depth.max(depth);
        direct.extend(root_direct);
        transitive.extend(root_transitive);
    }

    summary.root_components = roots.len();
    summary.direct_dependencies = direct.len();
    summary.transitive_dependencies = transitive.difference(&direct).count();
    summary
}

/// Breadth-first walk from `start`, returning (depth, direct, transitive).
fn walk<'a>(
    graph: &HashMap<&'a str, Vec<&'a str>>,
    start: &'a str,
) -> (usize, HashSet<&'a str>, HashSet<&'a str>) {
    let direct: HashSet<&str> = graph.get(start).into_iter().flatten().copied().collect();
    if direct.is_empty() {
        return (0, direct, HashSet::new());
    }

    let mut seen: HashSet<&str> = direct.iter().copied().collect();
    seen.insert(start);
    let mut transitive = HashSet::new();
    let mut max_depth = 1;
    let mut queue: VecDeque<(&str, usize)> = direct.iter().map(|c| (*c, 1)).collect();

    while let Some((node, depth)) = queue.pop_front() {
        max_depth = max_depth.max(depth);
        for &next in graph.get(node).into_iter().flatten() {
            if seen.insert(next) {
                transitive.insert(next);
                queue.push_back((next, depth + 1));
            }
        }
    }

    (max_depth, direct, transitive)
}

/// Index from package URL and (name, version) to SBOM `bom-ref`.
#[derive(Debug, Default)]
pub struct ComponentIndex {
    by_purl: HashMap<String, String>,
    by_name_version: HashMap<(String, String), String>,
}

impl ComponentIndex {
    pub fn from_sbom(sbom: &Value) -> Self {
        let mut index = Self::default();
        for component in sbom["components"].as_array().into_iter().flatten() {
            let Some(bom_ref) = component["bom-ref"].as_str() else {
                continue;
            };
            if let Some(purl) = component["purl"].as_str() {
                index.by_purl.insert(purl.to_string(), bom_ref.to_string());
            }
            if let Some(name) = component["name"].as_str() {
                let version = component["version"].as_str().unwrap_or_default();
                index
                    .by_name_version
                    .insert((name.to_string(), version.to_string()), bom_ref.to_string());
            }
        }
        index
    }

    pub fn lookup(&self, purl: Option<&str>, name: &str, version: &str) -> Option<&str> {
        purl.and_then(|p| self.by_purl.get(p))
            .or_else(|| {
                self.by_name_version
                    .get(&(name.to_string(), version.to_string()))
            })
            .map(String::as_str)
    }
}
