//! Assembling a ready-to-ask agent from configuration.

use std::sync::Arc;

use askdb_core::Config;
use askdb_tool_runtime::tools::{ClarifyCallback, TerminateCallback};
use askdb_tool_runtime::{
    AgentSession, CompletionGateway, RetryingGateway, SessionOptions, SqlEngine, TurnOutcome,
};
use askdb_warehouse::SqliteWarehouse;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::prompts::SYSTEM_PROMPT;
use crate::toolbox::Toolbox;

/// Builder for [`Agent`].
///
/// Without an explicit gateway one is created from `config.llm`; without an
/// explicit engine the warehouse named by `config.database` is opened.
pub struct AgentBuilder {
    config: Config,
    gateway: Option<Arc<dyn CompletionGateway>>,
    engine: Option<Arc<dyn SqlEngine>>,
    clarify: Option<ClarifyCallback>,
    terminate: Option<TerminateCallback>,
    system_prompt: String,
    context: Vec<String>,
    sources: Vec<String>,
}

impl AgentBuilder {
    pub fn new(config: Config) -> Self {
        let sources = config.database.tables.clone();
        Self {
            config,
            gateway: None,
            engine: None,
            clarify: None,
            terminate: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            context: Vec::new(),
            sources,
        }
    }

    pub fn gateway(mut self, gateway: Arc<dyn CompletionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn SqlEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn clarification_callback(mut self, callback: ClarifyCallback) -> Self {
        self.clarify = Some(callback);
        self
    }

    pub fn terminate_callback(mut self, callback: TerminateCallback) -> Self {
        self.terminate = Some(callback);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Extra background appended after the bootstrap.
    pub fn context(mut self, text: impl Into<String>) -> Self {
        self.context.push(text.into());
        self
    }

    /// A file or URL to load before the session starts.
    pub fn source(mut self, location: impl Into<String>) -> Self {
        self.sources.push(location.into());
        self
    }

    pub async fn build(self) -> Result<Agent, AgentError> {
        self.config.agent.validate()?;
        let inner = match self.gateway {
            Some(gateway) => gateway,
            None => {
                self.config.validate()?;
                askdb_llm::create_gateway(&self.config.llm)?
            }
        };
        let gateway: Arc<dyn CompletionGateway> = Arc::new(RetryingGateway::new(inner));

        let engine: Arc<dyn SqlEngine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(SqliteWarehouse::from_config(&self.config.database).await?),
        };

        let mut loaded = Vec::new();
        for source in &self.sources {
            let statements = engine.load(source).await?;
            info!(source = %source, statements = statements.len(), "Loaded startup data");
            loaded.extend(statements);
        }

        let toolbox = Toolbox {
            features: self.config.agent.clone(),
            wikidata: self.config.wikidata.clone(),
            engine: Some(engine.clone()),
            gateway: gateway.clone(),
            planning_model: self.config.llm.planning_model.clone(),
            clarify: self.clarify,
            terminate: self.terminate,
        };
        if self.config.agent.enable_clarification && toolbox.clarify.is_none() {
            warn!("Clarification enabled but no callback supplied; clarify tool disabled");
        }
        let registry = toolbox.build_registry()?;

        let options = SessionOptions::new(self.config.llm.model.clone())
            .with_max_iterations(self.config.agent.max_iterations)
            .with_verbose(self.config.agent.verbose);
        let provider = gateway.provider_name().to_string();
        let mut session = AgentSession::start(gateway, registry, self.system_prompt, options).await?;
        for text in &self.context {
            session.add_context(text);
        }

        info!(
            provider = %provider,
            model = %self.config.llm.model,
            tools = session.registry().len(),
            "Agent ready"
        );
        Ok(Agent {
            session,
            engine,
            loaded,
        })
    }
}

/// A started session together with the database it queries.
pub struct Agent {
    session: AgentSession,
    engine: Arc<dyn SqlEngine>,
    loaded: Vec<String>,
}

impl Agent {
    pub fn builder(config: Config) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    pub async fn ask(&mut self, question: &str) -> Result<TurnOutcome, AgentError> {
        Ok(self.session.ask(question).await?)
    }

    pub fn add_context(&mut self, text: &str) {
        self.session.add_context(text);
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn engine(&self) -> &Arc<dyn SqlEngine> {
        &self.engine
    }

    /// Statements executed while loading startup data.
    pub fn loaded_statements(&self) -> &[String] {
        &self.loaded
    }
}
