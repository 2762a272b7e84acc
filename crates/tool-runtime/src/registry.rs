use crate::tool::{Tool, ToolSpec, ANSWER_TOOL};
use indexmap::IndexMap;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a tool implementation once its setup parameters are resolved.
pub type ToolFactory =
    Arc<dyn Fn(&ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> + Send + Sync>;

/// How a registered spec is backed.
pub enum ToolBinding {
    /// A ready implementation.
    Instance(Arc<dyn Tool>),
    /// Constructed during [`ToolRegistry::instantiate`]. `setup` is a
    /// JSON-Schema-like object whose `properties` name the construction
    /// parameters; a property carrying `const` pins its value.
    Factory { setup: Value, factory: ToolFactory },
    /// Declared to the model only. Used for the `answer` protocol marker.
    Marker,
}

/// A caller-supplied setup value.
#[derive(Clone)]
pub enum SetupValue {
    Json(Value),
    /// Shared typed resource such as a database handle or a callback.
    Resource(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for SetupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupValue::Json(v) => write!(f, "Json({v})"),
            SetupValue::Resource(_) => f.write_str("Resource(..)"),
        }
    }
}

/// Keyword arguments offered to every factory during instantiation.
#[derive(Debug, Clone, Default)]
pub struct SetupArgs {
    values: HashMap<String, SetupValue>,
}

impl SetupArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), SetupValue::Json(value));
        self
    }

    pub fn resource<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.values
            .insert(name.into(), SetupValue::Resource(Arc::new(value)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SetupValue> {
        self.values.get(name)
    }
}

/// Setup parameters after precedence resolution, handed to one factory.
#[derive(Debug)]
pub struct ResolvedSetup {
    tool: String,
    values: HashMap<String, Option<SetupValue>>,
}

impl ResolvedSetup {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Resolved JSON value, `None` when the parameter resolved to nothing.
    pub fn json(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(Some(SetupValue::Json(v))) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.json(name).and_then(|v| v.as_str())
    }

    /// Resolved resource of type `T`.
    pub fn resource<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        match self.values.get(name) {
            Some(Some(SetupValue::Resource(r))) => r.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Like [`resource`](Self::resource) but a missing value is a setup error.
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> Result<&T, RegistryError> {
        self.resource(name).ok_or_else(|| RegistryError::Setup {
            tool: self.tool.clone(),
            reason: format!("missing setup parameter '{name}'"),
        })
    }
}

/// A single registry entry.
pub struct ToolEntry {
    spec: ToolSpec,
    setup: Option<Value>,
    factory: Option<ToolFactory>,
    implementation: Option<Arc<dyn Tool>>,
}

impl ToolEntry {
    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn implementation(&self) -> Option<Arc<dyn Tool>> {
        self.implementation.clone()
    }

    pub fn is_instantiated(&self) -> bool {
        self.implementation.is_some()
    }
}

/// Result of looking a name up for dispatch.
pub enum Lookup {
    Ready(Arc<dyn Tool>),
    /// Registered but never constructed.
    Uninstantiated,
    Missing,
}

/// Manages available tools, their specs, and lookup.
///
/// Insertion order is kept so the spec list offered to the model is stable
/// within a session.
pub struct ToolRegistry {
    entries: IndexMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Register a tool. Returns error if name already registered.
    pub fn register(&mut self, spec: ToolSpec, binding: ToolBinding) -> Result<(), RegistryError> {
        if self.entries.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateName(spec.name));
        }
        let (setup, factory, implementation) = match binding {
            ToolBinding::Instance(tool) => (None, None, Some(tool)),
            ToolBinding::Factory { setup, factory } => (Some(setup), Some(factory), None),
            ToolBinding::Marker => (None, None, None),
        };
        debug!(tool = %spec.name, "Registered tool");
        self.entries.insert(
            spec.name.clone(),
            ToolEntry {
                spec,
                setup,
                factory,
                implementation,
            },
        );
        Ok(())
    }

    /// Construct every factory-backed entry. Each setup parameter resolves
    /// as `const` in the definition, then the caller's value, then nothing.
    ///
    /// Returns the names of entries that remain without an implementation.
    pub fn instantiate(&mut self, args: &SetupArgs) -> Result<Vec<String>, RegistryError> {
        let mut uninstantiated = Vec::new();

        for (name, entry) in self.entries.iter_mut() {
            if entry.implementation.is_some() {
                continue;
            }
            let Some(factory) = entry.factory.clone() else {
                if name != ANSWER_TOOL {
                    warn!(tool = %name, "Tool has no implementation and no factory");
                    uninstantiated.push(name.clone());
                }
                continue;
            };
            let resolved = resolve_setup(name, entry.setup.as_ref(), args);
            let tool = factory(&resolved)?;
            debug!(tool = %name, "Instantiated tool");
            entry.implementation = Some(tool);
        }

        Ok(uninstantiated)
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match self.entries.get(name) {
            Some(entry) => match &entry.implementation {
                Some(tool) => Lookup::Ready(tool.clone()),
                None => Lookup::Uninstantiated,
            },
            None => Lookup::Missing,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Specs offered to the model, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries.values().map(|e| e.spec.clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_setup(tool: &str, setup: Option<&Value>, args: &SetupArgs) -> ResolvedSetup {
    let mut values = HashMap::new();
    let properties = setup
        .and_then(|s| s.get("properties"))
        .and_then(|p| p.as_object());

    if let Some(properties) = properties {
        for (param, definition) in properties {
            let value = match definition.get("const") {
                Some(constant) => Some(SetupValue::Json(constant.clone())),
                None => args.get(param).cloned(),
            };
            values.insert(param.clone(), value);
        }
    }

    ResolvedSetup {
        tool: tool.to_string(),
        values,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
    #[error("Failed to set up tool '{tool}': {reason}")]
    Setup { tool: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoTool;
    use crate::tool::{answer_spec, ToolContext, ToolError, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;

    struct Greeting(String);

    #[async_trait]
    impl Tool for Greeting {
        async fn execute(&self, _input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::Text(self.0.clone()))
        }
    }

    fn greeting_factory() -> ToolFactory {
        Arc::new(|setup: &ResolvedSetup| -> Result<Arc<dyn Tool>, RegistryError> {
            let text = setup.string("greeting").unwrap_or("<none>").to_string();
            Ok(Arc::new(Greeting(text)) as Arc<dyn Tool>)
        })
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test tool", json!({"type": "object", "properties": {}}))
    }

    async fn run(registry: &ToolRegistry, name: &str) -> String {
        let transcript = crate::conversation::Transcript::new();
        let ctx = ToolContext {
            transcript: &transcript,
            verbose: false,
        };
        match registry.lookup(name) {
            Lookup::Ready(tool) => match tool.execute(json!({}), &ctx).await.unwrap() {
                ToolOutput::Text(t) => t,
                other => panic!("unexpected output {other:?}"),
            },
            _ => panic!("tool {name} not ready"),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry
            .register(spec("echo"), ToolBinding::Instance(Arc::new(EchoTool)))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(matches!(registry.lookup("echo"), Lookup::Ready(_)));
        assert!(matches!(registry.lookup("nonexistent"), Lookup::Missing));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry
            .register(spec("echo"), ToolBinding::Instance(Arc::new(EchoTool)))
            .unwrap();
        let err = registry
            .register(spec("echo"), ToolBinding::Marker)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "echo"));
    }

    #[test]
    fn test_specs_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(spec(name), ToolBinding::Marker).unwrap();
        }
        let names: Vec<_> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_setup_precedence_const_then_caller_then_none() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                spec("pinned"),
                ToolBinding::Factory {
                    setup: json!({"properties": {"greeting": {"type": "string", "const": "hello"}}}),
                    factory: greeting_factory(),
                },
            )
            .unwrap();
        registry
            .register(
                spec("supplied"),
                ToolBinding::Factory {
                    setup: json!({"properties": {"greeting": {"type": "string"}}}),
                    factory: greeting_factory(),
                },
            )
            .unwrap();
        registry
            .register(
                spec("unset"),
                ToolBinding::Factory {
                    setup: json!({"properties": {"farewell": {"type": "string"}}}),
                    factory: greeting_factory(),
                },
            )
            .unwrap();

        let args = SetupArgs::new().json("greeting", json!("from caller"));
        let missing = registry.instantiate(&args).unwrap();
        assert!(missing.is_empty());

        assert_eq!(run(&registry, "pinned").await, "hello");
        assert_eq!(run(&registry, "supplied").await, "from caller");
        assert_eq!(run(&registry, "unset").await, "<none>");
    }

    #[test]
    fn test_instantiate_reports_unbacked_entries() {
        let mut registry = ToolRegistry::new();
        registry.register(answer_spec(), ToolBinding::Marker).unwrap();
        registry.register(spec("ghost"), ToolBinding::Marker).unwrap();

        let missing = registry.instantiate(&SetupArgs::new()).unwrap();
        assert_eq!(missing, vec!["ghost".to_string()]);
        assert!(matches!(registry.lookup("ghost"), Lookup::Uninstantiated));
    }

    #[test]
    fn test_factory_failure_is_fatal() {
        let mut registry = ToolRegistry::new();
        let factory: ToolFactory = Arc::new(|setup: &ResolvedSetup| -> Result<Arc<dyn Tool>, RegistryError> {
            let handle = setup.require::<Arc<String>>("database")?;
            Ok(Arc::new(Greeting(handle.to_string())) as Arc<dyn Tool>)
        });
        registry
            .register(
                spec("needs_db"),
                ToolBinding::Factory {
                    setup: json!({"properties": {"database": {}}}),
                    factory,
                },
            )
            .unwrap();

        let err = registry.instantiate(&SetupArgs::new()).unwrap_err();
        assert!(err.to_string().contains("needs_db"));
    }

    #[test]
    fn test_resources_are_typed() {
        let args = SetupArgs::new().resource("database", Arc::new("db".to_string()));
        let resolved = resolve_setup("t", Some(&json!({"properties": {"database": {}}})), &args);
        assert!(resolved.resource::<Arc<String>>("database").is_some());
        assert!(resolved.resource::<u32>("database").is_none());
        assert!(resolved.json("database").is_none());
    }
}
