//! The tools an agent can offer, as one declarative table.
//!
//! Each row pairs a spec with a setup schema, a factory and an enablement
//! predicate. A session's registry is the table filtered by the predicates,
//! in table order.

use std::sync::Arc;
use std::time::Duration;

use askdb_core::config::{AgentConfig, WikidataConfig};
use askdb_tool_runtime::tools::{
    ClarifyCallback, ClarifyTool, DescribeTableTool, ExecuteSqlTool, LoadDataTool, ResearchTool,
    TerminateCallback, TerminateTool, WikidataTool,
};
use askdb_tool_runtime::{
    answer_spec, CompletionGateway, RegistryError, ResolvedSetup, SetupArgs, SqlEngine, Tool,
    ToolBinding, ToolRegistry, ToolSpec,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::prompts::RESEARCH_PROMPT;

type Factory = fn(&ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError>;

struct ToolboxEntry {
    spec: fn() -> ToolSpec,
    setup: fn(&Toolbox) -> Value,
    /// `None` registers the spec as a protocol marker.
    factory: Option<Factory>,
    enabled: fn(&Toolbox) -> bool,
}

const TOOLBOX: &[ToolboxEntry] = &[
    ToolboxEntry {
        spec: ExecuteSqlTool::show_tables_spec,
        setup: show_tables_setup,
        factory: Some(build_show_tables),
        enabled: has_database,
    },
    ToolboxEntry {
        spec: ExecuteSqlTool::spec,
        setup: database_setup,
        factory: Some(build_execute_sql),
        enabled: has_database,
    },
    ToolboxEntry {
        spec: DescribeTableTool::spec,
        setup: database_setup,
        factory: Some(build_describe_table),
        enabled: has_database,
    },
    ToolboxEntry {
        spec: LoadDataTool::spec,
        setup: database_setup,
        factory: Some(build_load_data),
        enabled: has_database,
    },
    ToolboxEntry {
        spec: WikidataTool::spec,
        setup: wikidata_setup,
        factory: Some(build_wikidata),
        enabled: |t| t.features.enable_wikidata,
    },
    ToolboxEntry {
        spec: ClarifyTool::spec,
        setup: |_| params(&["clarification_callback"]),
        factory: Some(build_clarify),
        enabled: |t| t.features.enable_clarification && t.clarify.is_some(),
    },
    ToolboxEntry {
        spec: TerminateTool::spec,
        setup: |_| params(&["terminate_callback"]),
        factory: Some(build_terminate),
        enabled: |t| t.features.enable_terminate && t.terminate.is_some(),
    },
    ToolboxEntry {
        spec: ResearchTool::spec,
        setup: |_| params(&["gateway", "planning_model", "research_window"]),
        factory: Some(build_research),
        enabled: |t| t.features.enable_research,
    },
    ToolboxEntry {
        spec: answer_spec,
        setup: |_| Value::Null,
        factory: None,
        enabled: |_| true,
    },
];

/// Everything the toolbox needs to decide on and construct a session's tools.
pub struct Toolbox {
    pub features: AgentConfig,
    pub wikidata: WikidataConfig,
    pub engine: Option<Arc<dyn SqlEngine>>,
    pub gateway: Arc<dyn CompletionGateway>,
    pub planning_model: String,
    pub clarify: Option<ClarifyCallback>,
    pub terminate: Option<TerminateCallback>,
}

impl Toolbox {
    pub fn new(gateway: Arc<dyn CompletionGateway>, features: AgentConfig) -> Self {
        Self {
            features,
            wikidata: WikidataConfig::default(),
            engine: None,
            gateway,
            planning_model: askdb_core::config::DEFAULT_PLANNING_MODEL.to_string(),
            clarify: None,
            terminate: None,
        }
    }

    /// Names of the tools this toolbox would register, in order.
    pub fn enabled_tools(&self) -> Vec<String> {
        TOOLBOX
            .iter()
            .filter(|entry| (entry.enabled)(self))
            .map(|entry| (entry.spec)().name)
            .collect()
    }

    /// Caller-supplied setup values offered to every factory.
    pub fn setup_args(&self) -> SetupArgs {
        let mut args = SetupArgs::new()
            .resource("gateway", self.gateway.clone())
            .json("planning_model", json!(self.planning_model))
            .json("research_window", json!(self.features.research_window))
            .json("wikidata_endpoint", json!(self.wikidata.url))
            .json("wikidata_timeout_secs", json!(self.wikidata.timeout_secs));
        if let Some(engine) = &self.engine {
            args = args.resource("database", engine.clone());
        }
        if let Some(callback) = &self.clarify {
            args = args.resource("clarification_callback", callback.clone());
        }
        if let Some(callback) = &self.terminate {
            args = args.resource("terminate_callback", callback.clone());
        }
        args
    }

    /// Register and instantiate every enabled tool.
    pub fn build_registry(&self) -> Result<ToolRegistry, RegistryError> {
        let mut registry = ToolRegistry::new();
        for entry in TOOLBOX.iter().filter(|entry| (entry.enabled)(self)) {
            let binding = match entry.factory {
                Some(factory) => ToolBinding::Factory {
                    setup: (entry.setup)(self),
                    factory: Arc::new(factory),
                },
                None => ToolBinding::Marker,
            };
            registry.register((entry.spec)(), binding)?;
        }
        registry.instantiate(&self.setup_args())?;
        debug!(tools = ?registry.names().collect::<Vec<_>>(), "Toolbox ready");
        Ok(registry)
    }
}

fn has_database(toolbox: &Toolbox) -> bool {
    toolbox.engine.is_some()
}

/// A setup schema naming `names`, none of them pinned.
fn params(names: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> =
        names.iter().map(|name| (name.to_string(), json!({}))).collect();
    json!({"type": "object", "properties": properties})
}

fn database_setup(_: &Toolbox) -> Value {
    params(&["database"])
}

/// `show_tables` is `execute_sql` with its query pinned to the catalog query.
fn show_tables_setup(toolbox: &Toolbox) -> Value {
    let mut setup = params(&["database"]);
    if let Some(engine) = &toolbox.engine {
        setup["properties"]["query"] = json!({"type": "string", "const": engine.catalog_query()});
    }
    setup
}

fn wikidata_setup(_: &Toolbox) -> Value {
    params(&["wikidata_endpoint", "wikidata_timeout_secs"])
}

fn setup_error(setup: &ResolvedSetup, reason: impl Into<String>) -> RegistryError {
    RegistryError::Setup {
        tool: setup.tool().to_string(),
        reason: reason.into(),
    }
}

fn engine(setup: &ResolvedSetup) -> Result<Arc<dyn SqlEngine>, RegistryError> {
    setup.require::<Arc<dyn SqlEngine>>("database").cloned()
}

fn build_show_tables(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    let query = setup
        .string("query")
        .ok_or_else(|| setup_error(setup, "missing catalog query"))?;
    Ok(Arc::new(ExecuteSqlTool::with_fixed_query(engine(setup)?, query)))
}

fn build_execute_sql(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    Ok(Arc::new(ExecuteSqlTool::new(engine(setup)?)))
}

fn build_describe_table(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    Ok(Arc::new(DescribeTableTool::new(engine(setup)?)))
}

fn build_load_data(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    Ok(Arc::new(LoadDataTool::new(engine(setup)?)))
}

fn build_wikidata(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    let endpoint = setup
        .string("wikidata_endpoint")
        .unwrap_or(askdb_tool_runtime::tools::wikidata::DEFAULT_ENDPOINT);
    let timeout = setup
        .json("wikidata_timeout_secs")
        .and_then(Value::as_u64)
        .unwrap_or(60);
    let tool = WikidataTool::new(endpoint, Duration::from_secs(timeout))
        .map_err(|e| setup_error(setup, e.to_string()))?;
    Ok(Arc::new(tool))
}

fn build_clarify(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    let callback = setup.require::<ClarifyCallback>("clarification_callback")?;
    Ok(Arc::new(ClarifyTool::new(callback.clone())))
}

fn build_terminate(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    let callback = setup.require::<TerminateCallback>("terminate_callback")?;
    Ok(Arc::new(TerminateTool::new(callback.clone())))
}

fn build_research(setup: &ResolvedSetup) -> Result<Arc<dyn Tool>, RegistryError> {
    let gateway = setup.require::<Arc<dyn CompletionGateway>>("gateway")?;
    let model = setup
        .string("planning_model")
        .ok_or_else(|| setup_error(setup, "missing planning model"))?;
    let mut tool = ResearchTool::new(gateway.clone(), model, RESEARCH_PROMPT);
    if let Some(window) = setup.json("research_window").and_then(Value::as_u64) {
        tool = tool.with_window(window as usize);
    }
    Ok(Arc::new(tool))
}
