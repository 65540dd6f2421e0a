// Job type registry (spec §4.2)
//
// Process-global, populated once at daemon startup from static
// configuration (SPEC_FULL §6 "job_type -> {...}"). Every job_type the
// controller and executor ever see must have been registered here first;
// an unregistered job_type is `AppError::UnknownJobType`.

use crate::domain::{Job, TaskPlan};
use crate::error::{AppError, Result};
use crate::port::{PreflightValidator, TaskHandler};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// The JSON types a field may be declared as (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// Declarative shape of one accepted parameter (spec §4.2: `{type,
/// required, default, allowed_values, regex}` per field). Validation
/// here is limited to "is this parameter set well-formed" (spec §4.3
/// step: validate against schema) -- it is not a substitute for the
/// side-effecting pre-flight validators that follow it. Centralized
/// here so that controllers never need to re-check these shapes
/// ad-hoc (spec §4.2).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub field_type: FieldType,
    /// Applied to `parameters` by [`ParameterSchema::apply_defaults`]
    /// when the field is absent and not required.
    pub default: Option<serde_json::Value>,
    /// If non-empty, the field's value (as a string) must be one of
    /// these. Only meaningful for `FieldType::String` fields.
    pub allowed_values: Vec<String>,
    /// If set, the field's string value must match this pattern.
    pub regex: Option<String>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: true,
            field_type,
            default: None,
            allowed_values: Vec::new(),
            regex: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: false,
            field_type,
            default: None,
            allowed_values: Vec::new(),
            regex: None,
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed_values(mut self, allowed_values: Vec<String>) -> Self {
        self.allowed_values = allowed_values;
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    pub fields: Vec<FieldSpec>,
}

impl ParameterSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Fills in `default` for any declared field absent from
    /// `parameters`, mutating it in place (spec §4.2 `default`).
    /// Required fields are never defaulted — their absence is a
    /// validation error, not something to paper over.
    pub fn apply_defaults(&self, parameters: &mut serde_json::Value) {
        let Some(obj) = parameters.as_object_mut() else {
            return;
        };
        for field in &self.fields {
            if field.required {
                continue;
            }
            if let Some(default) = &field.default {
                obj.entry(field.name.clone()).or_insert_with(|| default.clone());
            }
        }
    }

    /// Checks required-field presence, JSON type, `allowed_values`
    /// membership, and `regex` match. Returns one issue per violation
    /// so the caller can report them all at once (spec §7
    /// ValidationError is synchronous and pre-submit).
    pub fn validate(&self, parameters: &serde_json::Value) -> Vec<crate::error::FieldIssue> {
        let mut issues = Vec::new();
        let obj = parameters.as_object();

        for field in &self.fields {
            let value = obj.and_then(|o| o.get(&field.name));

            let value = match value {
                Some(value) => value,
                None => {
                    if field.required {
                        issues.push(crate::error::FieldIssue {
                            field: field.name.clone(),
                            message: "required field is missing".to_string(),
                        });
                    }
                    continue;
                }
            };

            if !field.field_type.matches(value) {
                issues.push(crate::error::FieldIssue {
                    field: field.name.clone(),
                    message: format!("expected type {}", field.field_type.name()),
                });
                continue;
            }

            let as_str = value.as_str();

            if !field.allowed_values.is_empty() {
                let ok = as_str.map(|s| field.allowed_values.iter().any(|v| v == s)).unwrap_or(false);
                if !ok {
                    issues.push(crate::error::FieldIssue {
                        field: field.name.clone(),
                        message: format!("must be one of: {}", field.allowed_values.join(", ")),
                    });
                }
            }

            if let Some(pattern) = &field.regex {
                let matched = as_str
                    .and_then(|s| Regex::new(pattern).ok().map(|re| re.is_match(s)))
                    .unwrap_or(false);
                if !matched {
                    issues.push(crate::error::FieldIssue {
                        field: field.name.clone(),
                        message: format!("must match pattern: {pattern}"),
                    });
                }
            }
        }

        issues
    }
}

pub type PlanStageFn = dyn Fn(&Job, i32) -> Vec<TaskPlan> + Send + Sync;
pub type FinalizeFn = dyn Fn(&Job, &serde_json::Value) -> serde_json::Value + Send + Sync;
pub type SanitizeErrorFn = dyn Fn(&str) -> String + Send + Sync;

/// Everything the controller and executor need to know about one
/// `job_type` (spec §4.2).
pub struct JobDefinition {
    pub job_type: String,
    pub parameters_schema: ParameterSchema,
    pub total_stages: i32,
    pub resource_validators: Vec<Arc<dyn PreflightValidator>>,
    pub plan_stage: Arc<PlanStageFn>,
    pub finalize: Arc<FinalizeFn>,
    pub sanitize_error: Arc<SanitizeErrorFn>,
}

impl JobDefinition {
    pub fn plan_stage(&self, job: &Job, stage: i32) -> Vec<TaskPlan> {
        (self.plan_stage)(job, stage)
    }

    pub fn finalize(&self, job: &Job, stage_results: &serde_json::Value) -> serde_json::Value {
        (self.finalize)(job, stage_results)
    }

    pub fn sanitize_error(&self, raw: &str) -> String {
        (self.sanitize_error)(raw)
    }
}

/// Registry of job type definitions, built once at startup (spec §4.2:
/// "Process-global. Populated at startup.").
#[derive(Default)]
pub struct JobRegistry {
    definitions: HashMap<String, Arc<JobDefinition>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: JobDefinition) {
        self.definitions
            .insert(definition.job_type.clone(), Arc::new(definition));
    }

    pub fn get(&self, job_type: &str) -> Result<Arc<JobDefinition>> {
        self.definitions
            .get(job_type)
            .cloned()
            .ok_or_else(|| AppError::UnknownJobType(job_type.to_string()))
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.definitions.contains_key(job_type)
    }

    /// All registered job types, used by the RPC server to register one
    /// submission method per type (SPEC_FULL §6).
    pub fn job_types(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }
}

/// Registry of `task_type -> handler` (spec §1 "Out of scope: ...
/// concrete task implementations are provided by registered handler
/// functions"). Separate from [`JobRegistry`] because a handler can be
/// shared across stages/job types that happen to need the same unit of
/// work.
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn get(&self, task_type: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| AppError::UnknownJobType(format!("task_type:{task_type}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::task_handler::mocks::{MockBehavior, MockTaskHandler};

    #[test]
    fn parameter_schema_reports_all_missing_required_fields() {
        let schema = ParameterSchema::new(vec![
            FieldSpec::required("dataset_id", FieldType::String),
            FieldSpec::optional("comment", FieldType::String),
            FieldSpec::required("version_id", FieldType::String),
        ]);

        let issues = schema.validate(&serde_json::json!({"comment": "hi"}));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.field == "dataset_id"));
        assert!(issues.iter().any(|i| i.field == "version_id"));
    }

    #[test]
    fn parameter_schema_passes_when_required_fields_present() {
        let schema = ParameterSchema::new(vec![FieldSpec::required("dataset_id", FieldType::String)]);
        let issues = schema.validate(&serde_json::json!({"dataset_id": "abc"}));
        assert!(issues.is_empty());
    }

    #[test]
    fn parameter_schema_rejects_wrong_type() {
        let schema = ParameterSchema::new(vec![FieldSpec::required("max_retries", FieldType::Number)]);
        let issues = schema.validate(&serde_json::json!({"max_retries": "three"}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "max_retries");
    }

    #[test]
    fn parameter_schema_enforces_allowed_values() {
        let schema = ParameterSchema::new(vec![FieldSpec::required("format", FieldType::String)
            .with_allowed_values(vec!["geojson".to_string(), "gpkg".to_string()])]);

        assert!(schema.validate(&serde_json::json!({"format": "geojson"})).is_empty());
        let issues = schema.validate(&serde_json::json!({"format": "shapefile"}));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn parameter_schema_enforces_regex() {
        let schema = ParameterSchema::new(vec![FieldSpec::required("dataset_id", FieldType::String)
            .with_regex(r"^[a-z0-9-]+$")]);

        assert!(schema.validate(&serde_json::json!({"dataset_id": "parcels-2024"})).is_empty());
        let issues = schema.validate(&serde_json::json!({"dataset_id": "Parcels 2024"}));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn apply_defaults_fills_absent_optional_fields_only() {
        let schema = ParameterSchema::new(vec![
            FieldSpec::optional("format", FieldType::String).with_default(serde_json::json!("geojson")),
            FieldSpec::required("dataset_id", FieldType::String),
        ]);

        let mut parameters = serde_json::json!({"dataset_id": "parcels-2024"});
        schema.apply_defaults(&mut parameters);
        assert_eq!(parameters["format"], "geojson");

        let mut overridden = serde_json::json!({"dataset_id": "parcels-2024", "format": "gpkg"});
        schema.apply_defaults(&mut overridden);
        assert_eq!(overridden["format"], "gpkg");
    }

    #[test]
    fn job_registry_returns_unknown_job_type_error() {
        let registry = JobRegistry::new();
        assert!(registry.get("ingest_vector").is_err());
        assert!(!registry.contains("ingest_vector"));
    }

    #[test]
    fn task_handler_registry_round_trips_registration() {
        let mut registry = TaskHandlerRegistry::new();
        registry.register(
            "fetch_tile",
            Arc::new(MockTaskHandler::new(MockBehavior::Success)),
        );
        assert!(registry.get("fetch_tile").is_ok());
        assert!(registry.get("unregistered_type").is_err());
    }
}
