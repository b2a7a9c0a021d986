//! Stage agent: one model call inside the pipeline.
//!
//! [`StageAgent`] renders its instruction from declared inputs, calls the
//! backend with transport retry, and turns the reply into a [`StageValue`]
//! stored under its output key. Structured stages validate the reply against
//! their [`OutputSchema`] right away, so a malformed reply fails the stage
//! that produced it instead of surfacing later during the final merge.

use crate::{
    backend::{self, GenerationConfig, LlmRequest, Tool},
    context::{NamedContext, StageValue},
    error::Result,
    events::{emit, Event},
    exec_ctx::ExecCtx,
    parsing::{self, Extraction},
    payload::{claim_key, BoxFut, Payload},
    prompt,
    schema::OutputSchema,
    PipelineError,
};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Default model for every stage.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// A single model-backed stage.
///
/// # Example
///
/// ```
/// use leftover_chef::agent::StageAgent;
/// use leftover_chef::backend::Tool;
///
/// let thinker = StageAgent::new("RecipeThinker", "Find a healthy recipe using {leftover_list}.")
///     .reads(&["leftover_list"])
///     .with_tool(Tool::GoogleSearch)
///     .output_key("recipe");
/// assert_eq!(thinker.output(), "recipe");
/// ```
#[derive(Debug, Clone)]
pub struct StageAgent {
    /// Instance name (for logging/events).
    name: String,
    /// Instruction template with `{key}` placeholders for declared inputs.
    instruction: String,
    /// Context key the result is stored under.
    output_key: String,
    /// Context keys the instruction interpolates.
    inputs: Vec<String>,
    /// Model identifier.
    model: String,
    config: GenerationConfig,
    tools: Vec<Tool>,
    schema: Option<OutputSchema>,
}

impl StageAgent {
    /// Create a stage. The output key defaults to the stage name.
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            output_key: name.clone(),
            name,
            instruction: instruction.into(),
            inputs: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            config: GenerationConfig::default(),
            tools: Vec::new(),
            schema: None,
        }
    }

    /// Store the result under `key`.
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    /// Declare the context keys the instruction reads.
    pub fn reads(mut self, keys: &[&str]) -> Self {
        self.inputs = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Allow the model to use `tool` while answering.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    /// Require the reply to match `schema`.
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn output(&self) -> &str {
        &self.output_key
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn schema(&self) -> Option<OutputSchema> {
        self.schema
    }

    fn build_request(&self, instruction: String, message: &str) -> LlmRequest {
        LlmRequest {
            stage: self.name.clone(),
            model: self.model.clone(),
            system_instruction: Some(instruction),
            prompt: message.to_string(),
            config: self.config.clone(),
            tools: self.tools.clone(),
            response_schema: self.schema.map(|s| s.response_schema()),
        }
    }

    /// Call the backend with the context's retry policy, reporting each
    /// transport retry as an event.
    async fn call_backend(&self, ctx: &ExecCtx, request: &LlmRequest) -> Result<String> {
        let name = self.name.clone();
        let event_handler = ctx.event_handler.clone();

        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            emit(
                &event_handler,
                Event::TransportRetry {
                    name: name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let response = backend::with_backoff(
            &ctx.backend,
            &ctx.client,
            &ctx.base_url,
            request,
            &ctx.backoff,
            Some(&mut on_retry),
        )
        .await?;

        tracing::debug!(
            stage = %self.name,
            status = response.status,
            metadata = ?response.metadata,
            "model replied"
        );
        Ok(response.text)
    }

    /// Turn a raw reply into the value stored in the context.
    fn build_output(&self, raw: &str) -> Result<StageValue> {
        let Some(schema) = self.schema else {
            return Ok(StageValue::Text(parsing::strip_think_tags(raw)));
        };

        let violation = |reason: String| PipelineError::SchemaViolation {
            stage: self.name.clone(),
            reason,
        };

        let (value, how) = parsing::extract_json(raw).map_err(violation)?;
        if how != Extraction::Direct {
            tracing::debug!(stage = %self.name, extraction = ?how, "recovered JSON from reply");
        }
        let structured = schema.validate(value).map_err(violation)?;
        Ok(StageValue::Structured(structured))
    }

    async fn run(&self, ctx: &ExecCtx, message: &str, context: &NamedContext) -> Result<NamedContext> {
        let instruction = prompt::render(&self.name, &self.instruction, &self.inputs, context)?;
        let request = self.build_request(instruction, message);

        let raw = self
            .call_backend(ctx, &request)
            .await
            .map_err(|e| e.in_stage(&self.name))?;

        let value = self.build_output(&raw).inspect_err(|e| {
            if let PipelineError::SchemaViolation { reason, .. } = e {
                emit(
                    &ctx.event_handler,
                    Event::SchemaRejected {
                        name: self.name.clone(),
                        reason: reason.clone(),
                    },
                );
            }
        })?;

        Ok(NamedContext::new().with(self.output_key.clone(), value))
    }
}

impl Payload for StageAgent {
    fn kind(&self) -> &'static str {
        "agent"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check_wiring(&self, available: &mut BTreeSet<String>) -> Result<()> {
        for key in prompt::placeholders(&self.instruction) {
            if !self.inputs.contains(&key) {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage '{}' interpolates '{{{}}}' without declaring it as an input",
                    self.name, key
                )));
            }
        }
        for key in &self.inputs {
            if !available.contains(key) {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage '{}' reads '{}', which no upstream stage produces",
                    self.name, key
                )));
            }
        }
        claim_key(available, &self.name, &self.output_key)
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a ExecCtx,
        message: &'a str,
        context: &'a NamedContext,
    ) -> BoxFut<'a, Result<NamedContext>> {
        Box::pin(async move {
            emit(
                &ctx.event_handler,
                Event::StageStart {
                    name: self.name.clone(),
                    kind: self.kind(),
                },
            );
            let started = Instant::now();

            let result = self.run(ctx, message, context).await;

            emit(
                &ctx.event_handler,
                Event::StageEnd {
                    name: self.name.clone(),
                    ok: result.is_ok(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            );
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::events::FnEventHandler;
    use crate::schema::{ShoppingList, StructuredOutput};
    use std::sync::{Arc, Mutex};

    fn ctx_with(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder(mock)
            .backoff(backend::BackoffConfig::none())
            .build()
            .unwrap()
    }

    fn shopping_agent() -> StageAgent {
        StageAgent::new(
            "FoodShopping",
            "Return a shopping list based on {leftover_list} and {recipe}.",
        )
        .reads(&["leftover_list", "recipe"])
        .with_schema(OutputSchema::ShoppingList)
        .output_key("shopping_list")
    }

    fn upstream() -> NamedContext {
        NamedContext::new()
            .with("leftover_list", StageValue::Text(r#"{"eggs": 2}"#.into()))
            .with("recipe", StageValue::Text("French toast".into()))
    }

    #[test]
    fn test_build_output_text_strips_thinking() {
        let agent = StageAgent::new("RecipeThinker", "Find a recipe");
        let value = agent.build_output("<think>hmm</think> French toast").unwrap();
        assert_eq!(value, StageValue::Text("French toast".into()));
    }

    #[test]
    fn test_build_output_structured_from_fence() {
        let value = shopping_agent()
            .build_output("```json\n{\"items\": [\"butter\"]}\n```")
            .unwrap();
        assert_eq!(
            value,
            StageValue::Structured(StructuredOutput::ShoppingList(ShoppingList {
                items: vec!["butter".into()]
            }))
        );
    }

    #[test]
    fn test_build_output_schema_violation_names_stage() {
        let err = shopping_agent()
            .build_output(r#"{"groceries": ["butter"]}"#)
            .unwrap_err();
        match err {
            PipelineError::SchemaViolation { stage, reason } => {
                assert_eq!(stage, "FoodShopping");
                assert!(reason.contains("items"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_output_not_json() {
        let err = shopping_agent().build_output("You need butter.").unwrap_err();
        assert_eq!(err.stage(), Some("FoodShopping"));
    }

    #[test]
    fn test_build_request() {
        let agent = shopping_agent().with_tool(Tool::GoogleSearch).with_tool(Tool::GoogleSearch);
        let request = agent.build_request("instr".into(), "leftovers: eggs");
        assert_eq!(request.stage, "FoodShopping");
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.system_instruction.as_deref(), Some("instr"));
        assert_eq!(request.prompt, "leftovers: eggs");
        assert_eq!(request.tools, vec![Tool::GoogleSearch]);
        assert!(request.response_schema.is_some());
    }

    #[test]
    fn test_check_wiring_rejects_undeclared_placeholder() {
        let agent = StageAgent::new("RecipeThinker", "Find a recipe using {leftover_list}.");
        let mut available: BTreeSet<String> = ["leftover_list".to_string()].into();
        let err = agent.check_wiring(&mut available).unwrap_err();
        assert!(err.to_string().contains("without declaring"));
    }

    #[test]
    fn test_check_wiring_rejects_missing_upstream() {
        let mut available: BTreeSet<String> = ["leftover_list".to_string()].into();
        let err = shopping_agent().check_wiring(&mut available).unwrap_err();
        assert!(err.to_string().contains("'recipe'"));
    }

    #[test]
    fn test_check_wiring_claims_output() {
        let mut available: BTreeSet<String> =
            ["leftover_list".to_string(), "recipe".to_string()].into();
        shopping_agent().check_wiring(&mut available).unwrap();
        assert!(available.contains("shopping_list"));
        // Second writer of the same key is rejected
        assert!(shopping_agent().check_wiring(&mut available).is_err());
    }

    #[tokio::test]
    async fn test_invoke_renders_inputs_and_stores_output() {
        let mock = Arc::new(MockBackend::new().reply("FoodShopping", r#"{"items": ["butter"]}"#));
        let ctx = ctx_with(mock.clone());

        let out = shopping_agent()
            .invoke(&ctx, "leftovers: eggs", &upstream())
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert!(out.get("shopping_list").and_then(StageValue::as_structured).is_some());

        let sent = mock.request_for("FoodShopping").unwrap();
        assert_eq!(
            sent.system_instruction.as_deref(),
            Some(r#"Return a shopping list based on {"eggs": 2} and French toast."#)
        );
        assert_eq!(sent.prompt, "leftovers: eggs");
    }

    #[tokio::test]
    async fn test_invoke_transport_failure_is_attributed() {
        let mock = Arc::new(MockBackend::new().fail("FoodShopping", 503));
        let err = shopping_agent()
            .invoke(&ctx_with(mock), "x", &upstream())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some("FoodShopping"));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_invoke_emits_lifecycle_events() {
        let mock = Arc::new(MockBackend::new().reply("FoodShopping", "not json"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = ExecCtx::builder(mock)
            .backoff(backend::BackoffConfig::none())
            .event_handler(Arc::new(FnEventHandler(move |event: Event| {
                let label = match event {
                    Event::StageStart { .. } => "start",
                    Event::StageEnd { ok: true, .. } => "end-ok",
                    Event::StageEnd { ok: false, .. } => "end-err",
                    Event::SchemaRejected { .. } => "rejected",
                    Event::TransportRetry { .. } => "retry",
                };
                sink.lock().unwrap().push(label);
            })))
            .build()
            .unwrap();

        let result = shopping_agent().invoke(&ctx, "x", &upstream()).await;
        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), vec!["start", "rejected", "end-err"]);
    }
}
