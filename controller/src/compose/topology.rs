//! Compose topology
//!
//! The parts of a compose file the controller needs: services, named volumes,
//! deployment metadata (`x-metadata`) and the variable schema (`x-env-vars`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use openapi_server::models::DeploymentMetadata;
use serde::Deserialize;
use serde_yaml::Value;

use crate::errors::ControllerError;

#[derive(Debug, Default, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    services: BTreeMap<String, Value>,
    #[serde(default)]
    volumes: BTreeMap<String, Value>,
    #[serde(default, rename = "x-metadata")]
    metadata: Option<MetadataSection>,
    #[serde(default, rename = "x-env-vars")]
    env_vars: BTreeMap<String, EnvVarSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataSection {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    author: Option<String>,
    changelog: Option<String>,
    documentation_url: Option<String>,
}

/// Schema entry for a deployment variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvVarSchema {
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub default: Option<String>,
    #[serde(default = "default_var_type", rename = "type")]
    pub var_type: String,
    #[serde(default)]
    pub advanced: bool,
}

fn default_var_type() -> String {
    "string".to_string()
}

impl EnvVarSchema {
    /// Check `value` against the declared type
    ///
    /// Types other than integer, number, boolean and port accept any value.
    pub fn check_value(&self, value: &str) -> Result<(), String> {
        let valid = match self.var_type.to_ascii_lowercase().as_str() {
            "integer" | "int" => value.parse::<i64>().is_ok(),
            "number" | "float" => value.parse::<f64>().is_ok_and(f64::is_finite),
            "boolean" | "bool" => {
                matches!(value.to_ascii_lowercase().as_str(), "true" | "false" | "1" | "0")
            }
            "port" => value.parse::<u16>().is_ok_and(|port| port > 0),
            _ => true,
        };

        if valid {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid {}", value, self.var_type))
        }
    }
}

fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSection {
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    expose: Vec<Value>,
    #[serde(default)]
    depends_on: Option<DependsOn>,
    #[serde(default)]
    env_file: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

/// A compose service and its container
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDef {
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub ports: Vec<String>,
    pub depends_on: Vec<String>,
    pub uses_env_file: bool,
    definition: String,
}

/// Parsed compose topology
#[derive(Debug, Clone)]
pub struct ComposeTopology {
    project_name: String,
    services: Vec<ServiceDef>,
    volumes: Vec<String>,
    metadata: DeploymentMetadata,
    env_schema: BTreeMap<String, EnvVarSchema>,
}

impl ComposeTopology {
    /// Load the topology from a compose file
    pub async fn load(
        path: &Path,
        project_override: Option<&str>,
    ) -> Result<Self, ControllerError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ControllerError::ConfigError(format!(
                "Unable to read compose file {}: {}",
                path.display(),
                e
            ))
        })?;

        let fallback = path
            .canonicalize()
            .ok()
            .and_then(|p| {
                p.parent()
                    .and_then(|dir| dir.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "deployment".to_string());

        Self::parse(&contents, project_override, &fallback)
    }

    /// Parse compose YAML
    ///
    /// The project name comes from the override, then the file's `name:`,
    /// then `fallback` (compose uses the directory name).
    pub fn parse(
        contents: &str,
        project_override: Option<&str>,
        fallback: &str,
    ) -> Result<Self, ControllerError> {
        let file: ComposeFile = serde_yaml::from_str(contents)?;

        let raw_project = project_override
            .map(str::to_string)
            .or(file.name)
            .unwrap_or_else(|| fallback.to_string());
        let project_name = normalize_project_name(&raw_project);

        let mut services = Vec::with_capacity(file.services.len());
        for (name, value) in file.services {
            let section: ServiceSection = serde_yaml::from_value(value.clone())?;
            let depends_on = match section.depends_on {
                Some(DependsOn::List(list)) => list,
                Some(DependsOn::Map(map)) => map.into_keys().collect(),
                None => Vec::new(),
            };
            services.push(ServiceDef {
                container_name: section
                    .container_name
                    .unwrap_or_else(|| format!("{}-{}-1", project_name, name)),
                image: section.image.unwrap_or_default(),
                ports: section.expose.iter().filter_map(scalar_to_string).collect(),
                depends_on,
                uses_env_file: section.env_file.is_some(),
                definition: serde_yaml::to_string(&value)?,
                name,
            });
        }

        let section = file.metadata.unwrap_or_default();
        let metadata = DeploymentMetadata {
            id: section.id.unwrap_or_else(|| project_name.clone()),
            name: section.name.unwrap_or_else(|| project_name.clone()),
            description: section.description.unwrap_or_default(),
            version: section.version.unwrap_or_default(),
            author: section.author.unwrap_or_default(),
            changelog: section.changelog.unwrap_or_default(),
            documentation_url: section.documentation_url,
        };

        Ok(Self {
            project_name,
            services,
            volumes: file.volumes.into_keys().collect(),
            metadata,
            env_schema: file.env_vars,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn services(&self) -> &[ServiceDef] {
        &self.services
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn metadata(&self) -> &DeploymentMetadata {
        &self.metadata
    }

    pub fn env_schema(&self) -> &BTreeMap<String, EnvVarSchema> {
        &self.env_schema
    }

    /// Services whose definition references one of `variables`, or that load an env file
    pub fn services_consuming(&self, variables: &[String]) -> Vec<String> {
        let mut consumers = BTreeSet::new();
        for service in &self.services {
            if service.uses_env_file
                || variables
                    .iter()
                    .any(|var| references_variable(&service.definition, var))
            {
                consumers.insert(service.name.clone());
            }
        }
        consumers.into_iter().collect()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compose project names are lowercase alphanumerics, `-` and `_`
fn normalize_project_name(raw: &str) -> String {
    let name: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if name.is_empty() {
        "deployment".to_string()
    } else {
        name
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `text` interpolates `var` as `$VAR` or `${VAR...}`
pub fn references_variable(text: &str, var: &str) -> bool {
    if var.is_empty() {
        return false;
    }

    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        let after = &rest[pos + 1..];
        if let Some(braced) = after.strip_prefix('{') {
            if let Some(tail) = braced.strip_prefix(var) {
                if !tail.starts_with(is_ident_char) {
                    return true;
                }
            }
        } else if let Some(tail) = after.strip_prefix(var) {
            if !tail.starts_with(is_ident_char) {
                return true;
            }
        }
        rest = after;
    }
    false
}
