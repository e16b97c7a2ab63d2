//! Tool catalogs, one module per resource family.
//!
//! Each family declares its descriptors and any range checks that go beyond
//! the type-level schema (a replica count cannot be negative, a memory size
//! must be at least 1 GB, and so on).

mod cache;
mod cloud_compute;
mod cloud_managed_cache;
mod cloud_managed_db;
mod container;
mod proxy;
mod relational_db;

use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use crate::family::{ToolDefaults, ToolFamily};

/// Descriptors offered by `family`.
pub fn catalog(family: ToolFamily, defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    match family {
        ToolFamily::Cache => cache::catalog(defaults),
        ToolFamily::RelationalDb => relational_db::catalog(defaults),
        ToolFamily::Proxy => proxy::catalog(defaults),
        ToolFamily::Container => container::catalog(),
        ToolFamily::CloudCompute => cloud_compute::catalog(defaults),
        ToolFamily::CloudManagedDb => cloud_managed_db::catalog(defaults),
        ToolFamily::CloudManagedCache => cloud_managed_cache::catalog(defaults),
    }
}

/// Family-specific argument checks, run after schema validation.
pub fn check(family: ToolFamily, tool: &str, params: &ToolParams) -> Result<(), String> {
    match family {
        ToolFamily::Cache => cache::check(tool, params),
        ToolFamily::RelationalDb => relational_db::check(tool, params),
        ToolFamily::Proxy => proxy::check(tool, params),
        ToolFamily::Container => container::check(tool, params),
        ToolFamily::CloudCompute => cloud_compute::check(tool, params),
        ToolFamily::CloudManagedDb => cloud_managed_db::check(tool, params),
        ToolFamily::CloudManagedCache => cloud_managed_cache::check(tool, params),
    }
}

/// `project_id` parameter, defaulted to the configured project when there is one.
fn project_param(defaults: &ToolDefaults) -> ParamSpec {
    let spec = ParamSpec::string("Cloud project id");
    match &defaults.project_id {
        Some(project) => spec.with_default(project.as_str()),
        None => spec,
    }
}

fn int(params: &ToolParams, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

fn string<'a>(params: &'a ToolParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn at_least(params: &ToolParams, key: &str, min: i64) -> Result<(), String> {
    match int(params, key) {
        Some(v) if v < min => Err(format!("{} must be at least {}, got {}", key, min, v)),
        _ => Ok(()),
    }
}

fn non_empty(params: &ToolParams, key: &str) -> Result<(), String> {
    match string(params, key) {
        Some(v) if v.trim().is_empty() => Err(format!("{} must not be empty", key)),
        _ => Ok(()),
    }
}
