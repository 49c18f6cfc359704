// Service Description (static method metadata)
//
// Built once at startup, immutable afterwards and shared read-only across
// every concurrent call. Every call implicitly receives a `CallContext` as
// its first argument and returns an outcome (`Result`) as its last result;
// the field lists below describe only the data in between.

use crate::domain::arguments::Arguments;
use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Observability layers a service opts into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Trace,
    Logging,
    Metrics,
}

/// Wire shape of a parameter or result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ValueType {
    /// Whether a JSON value has this shape (`null` never does; only
    /// optional fields take it)
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
            ValueType::Any => !value.is_null(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Any => "any",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, typed parameter or result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default)]
    pub optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

/// Literal in `skip_log_fields` that suppresses response rendering
pub const SKIP_RESPONSE: &str = "response";

/// Metadata for one remote-callable method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    parameters: Vec<Field>,
    results: Vec<Field>,
    skip_log_fields: BTreeSet<String>,
}

impl MethodDescriptor {
    pub fn builder(name: impl Into<String>) -> MethodDescriptorBuilder {
        MethodDescriptorBuilder {
            name: name.into(),
            parameters: Vec::new(),
            results: Vec::new(),
            skip_log_fields: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Field] {
        &self.parameters
    }

    pub fn results(&self) -> &[Field] {
        &self.results
    }

    pub fn skip_log_fields(&self) -> &BTreeSet<String> {
        &self.skip_log_fields
    }

    /// Whether the logging layer must omit the rendered response
    pub fn skips_response(&self) -> bool {
        self.skip_log_fields.contains(SKIP_RESPONSE)
    }

    /// Bind raw JSON params to the declared parameters
    ///
    /// `null` binds as no arguments, an object binds by name (unknown keys are
    /// dropped), an array binds positionally in declaration order.
    ///
    /// # Errors
    /// `DomainError::InvalidParams` when a required parameter is missing, a
    /// value has the wrong shape, or params are neither object nor array.
    pub fn bind(&self, params: Value) -> Result<Arguments> {
        let mut bound = Map::new();

        match params {
            Value::Null => {}
            Value::Object(mut named) => {
                for field in &self.parameters {
                    if let Some(value) = named.remove(&field.name) {
                        bound.insert(field.name.clone(), value);
                    }
                }
            }
            Value::Array(positional) => {
                if positional.len() > self.parameters.len() {
                    return Err(DomainError::InvalidParams(format!(
                        "expected at most {} positional parameters, got {}",
                        self.parameters.len(),
                        positional.len()
                    )));
                }
                for (field, value) in self.parameters.iter().zip(positional) {
                    bound.insert(field.name.clone(), value);
                }
            }
            other => {
                return Err(DomainError::InvalidParams(format!(
                    "params must be an object or an array, got {}",
                    json_kind(&other)
                )));
            }
        }

        for field in &self.parameters {
            match bound.get(&field.name) {
                None | Some(Value::Null) if field.optional => {}
                None => {
                    return Err(DomainError::InvalidParams(format!(
                        "missing parameter '{}'",
                        field.name
                    )));
                }
                Some(value) if field.ty.accepts(value) => {}
                Some(_) => {
                    return Err(DomainError::InvalidParams(format!(
                        "parameter '{}' must be {}",
                        field.name, field.ty
                    )));
                }
            }
        }

        Ok(Arguments::from_map(bound))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') {
        return Err(DomainError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub struct MethodDescriptorBuilder {
    name: String,
    parameters: Vec<Field>,
    results: Vec<Field>,
    skip_log_fields: BTreeSet<String>,
}

impl MethodDescriptorBuilder {
    pub fn param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.parameters.push(Field::new(name, ty));
        self
    }

    pub fn optional_param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.parameters.push(Field::optional(name, ty));
        self
    }

    pub fn result(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.results.push(Field::new(name, ty));
        self
    }

    /// Exclude a parameter (or the whole response, via `"response"`) from call logs
    pub fn skip_log_field(mut self, field: impl Into<String>) -> Self {
        self.skip_log_fields.insert(field.into().trim().to_string());
        self
    }

    pub fn build(self) -> Result<MethodDescriptor> {
        validate_name(&self.name)?;

        let mut seen = BTreeSet::new();
        for field in &self.parameters {
            if !seen.insert(field.name.as_str()) {
                return Err(DomainError::DuplicateParameter {
                    method: self.name.clone(),
                    param: field.name.clone(),
                });
            }
        }

        Ok(MethodDescriptor {
            name: self.name,
            parameters: self.parameters,
            results: self.results,
            skip_log_fields: self.skip_log_fields,
        })
    }
}

/// Metadata for a named set of methods
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
    // lowercase method name -> position in `methods`
    index: HashMap<String, usize>,
    capabilities: BTreeSet<Capability>,
}

impl ServiceDescriptor {
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.into(),
            methods: Vec::new(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Load a descriptor document emitted by the upstream generator
    pub fn from_json(document: &str) -> Result<Self> {
        let doc: ServiceDocument = serde_json::from_str(document)
            .map_err(|e| DomainError::InvalidDocument(e.to_string()))?;

        let mut builder = ServiceDescriptor::builder(doc.name).capabilities(doc.capabilities);
        for method in doc.methods {
            let mut mb = MethodDescriptor::builder(method.name);
            mb.parameters = method.parameters;
            mb.results = method.results;
            for skip in method.skip_log_fields {
                mb = mb.skip_log_field(skip);
            }
            builder = builder.method(mb.build()?);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// Case-insensitive method lookup
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.methods[position])
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

pub struct ServiceDescriptorBuilder {
    name: String,
    methods: Vec<MethodDescriptor>,
    capabilities: BTreeSet<Capability>,
}

impl ServiceDescriptorBuilder {
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Result<ServiceDescriptor> {
        validate_name(&self.name)?;

        let mut index = HashMap::with_capacity(self.methods.len());
        for (position, method) in self.methods.iter().enumerate() {
            if index.insert(method.name.to_lowercase(), position).is_some() {
                return Err(DomainError::DuplicateMethod {
                    service: self.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        Ok(ServiceDescriptor {
            name: self.name,
            methods: self.methods.into_iter().map(Arc::new).collect(),
            index,
            capabilities: self.capabilities,
        })
    }
}

#[derive(Deserialize)]
struct ServiceDocument {
    name: String,
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default)]
    methods: Vec<MethodDocument>,
}

#[derive(Deserialize)]
struct MethodDocument {
    name: String,
    #[serde(default)]
    parameters: Vec<Field>,
    #[serde(default)]
    results: Vec<Field>,
    #[serde(default)]
    skip_log_fields: Vec<String>,
}
