//! The event handler: host events in, add-on results out.

use sidecar_config::AppConfig;
use sidecar_context::ContextBuilder;
use sidecar_core::error::{HostError, ProviderError};
use sidecar_core::{
    Addon, AddonSource, ChatMessage, CompletionRequest, HostContext, HostEvent, ResponseLocation,
    position_of_key,
};
use sidecar_formatter::{Dom, ResultFormatter, format_result, store};
use sidecar_providers::ProviderRouter;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// Wires host events to ContextBuilder, the AI backend and ResultFormatter.
///
/// Add-ons triggered by one event run one after another. No lock on the chat
/// or the document is held while a model call is in flight.
pub struct EventHandler<D: Dom> {
    /// Chat, cards and save hook
    host: HostContext,

    /// Add-on definitions
    addons: Arc<dyn AddonSource>,

    /// Per-add-on provider and model resolution
    router: Arc<ProviderRouter>,

    /// Prompt assembly
    builder: ContextBuilder,

    /// Persistence and presentation
    formatter: Arc<ResultFormatter<D>>,

    /// Sampling temperature for every add-on request
    temperature: f32,

    /// Response length cap for every add-on request
    max_tokens: Option<u32>,
}

impl<D: Dom> EventHandler<D> {
    pub fn new(
        host: HostContext,
        addons: Arc<dyn AddonSource>,
        router: Arc<ProviderRouter>,
        formatter: Arc<ResultFormatter<D>>,
    ) -> Self {
        Self {
            host,
            addons,
            router,
            builder: ContextBuilder::new(),
            formatter,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Take temperature and max tokens from the configuration defaults.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.temperature = config.default_temperature;
        self.max_tokens = Some(config.default_max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn formatter(&self) -> &Arc<ResultFormatter<D>> {
        &self.formatter
    }

    /// React to one host event.
    ///
    /// Returns how many results were produced (or restored, for a chat load).
    pub async fn handle_event(&self, event: &HostEvent) -> usize {
        match event {
            HostEvent::ChatLoaded { .. } => {
                self.formatter.invalidate_cache().await;
                let addons = self.addons.all_addons();
                self.formatter
                    .restore_blocks_from_metadata(&self.host.chat, &addons)
                    .await
            }
            HostEvent::MessageReceived { message_index, .. }
            | HostEvent::MessageRegenerated { message_index, .. } => {
                self.formatter.invalidate_cache().await;
                self.on_ai_message(*message_index).await
            }
            HostEvent::ManualTrigger { addon_ids, .. } => self.trigger_addons(addon_ids).await,
            HostEvent::RetryRequested {
                addon_id,
                message_key,
                ..
            } => usize::from(self.retry(addon_id, message_key).await),
        }
    }

    /// Consume events from the bus until it closes.
    pub async fn run(&self, mut events: broadcast::Receiver<Arc<HostEvent>>) {
        info!("Event handler started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    let produced = self.handle_event(&event).await;
                    debug!(produced, "Event handled");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event handler lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Event handler stopped");
    }

    /// Run every automatic add-on against a freshly received AI message.
    pub async fn on_ai_message(&self, message_index: usize) -> usize {
        let is_ai = {
            let chat = self.host.chat.read().await;
            chat.get(message_index)
                .is_some_and(|m| !m.is_user && m.has_text())
        };
        if !is_ai {
            debug!(message_index, "Not an AI message, no add-ons to run");
            return 0;
        }

        let addons: Vec<Addon> = self
            .addons
            .all_addons()
            .into_iter()
            .filter(Addon::runs_automatically)
            .collect();
        self.run_addons(&addons, message_index).await
    }

    /// Run add-ons by hand against the latest AI message.
    ///
    /// An empty id list runs every enabled add-on, regardless of trigger mode.
    pub async fn trigger_addons(&self, addon_ids: &[String]) -> usize {
        let Some(message_index) = latest_ai_index(&self.host.chat.read().await) else {
            warn!("No AI message to run add-ons against");
            return 0;
        };

        let addons: Vec<Addon> = if addon_ids.is_empty() {
            self.addons
                .all_addons()
                .into_iter()
                .filter(|a| a.enabled)
                .collect()
        } else {
            addon_ids
                .iter()
                .filter_map(|id| {
                    let addon = self.addons.addon(id);
                    if addon.is_none() {
                        warn!(addon_id = %id, "Unknown add-on requested");
                    }
                    addon
                })
                .collect()
        };

        self.run_addons(&addons, message_index).await
    }

    /// Re-run one add-on after its error indicator's Retry was pressed.
    pub async fn retry(&self, addon_id: &str, message_key: &str) -> bool {
        self.formatter.clear_error_indicator(addon_id).await;

        let Some(addon) = self.addons.addon(addon_id) else {
            warn!(addon_id, "Retry requested for an unknown add-on");
            return false;
        };

        let message_index = {
            let chat = self.host.chat.read().await;
            position_of_key(&chat, message_key).or_else(|| latest_ai_index(&chat))
        };
        let Some(message_index) = message_index else {
            warn!(addon_id, message_key, "Nothing to retry against");
            return false;
        };

        self.process_addon(&addon, message_index).await
    }

    async fn run_addons(&self, addons: &[Addon], message_index: usize) -> usize {
        if addons.is_empty() {
            return 0;
        }
        info!(count = addons.len(), message_index, "Running add-ons");

        let mut produced = 0;
        for addon in addons {
            if self.process_addon(addon, message_index).await {
                produced += 1;
            }
        }
        produced
    }

    /// Run one add-on with indicators, catching and displaying any failure.
    async fn process_addon(&self, addon: &Addon, message_index: usize) -> bool {
        self.formatter.clear_error_indicator(&addon.id).await;
        self.formatter.show_loading_indicator(addon).await;

        let outcome = self.execute(addon, message_index).await;
        self.formatter.hide_loading_indicator(addon).await;

        match outcome {
            Ok(()) => true,
            Err(e) => {
                error!(addon = %addon.name, message_index, error = %e, "Add-on failed");
                self.formatter
                    .show_error_indicator(addon, &e.to_string())
                    .await;
                false
            }
        }
    }

    /// Build, call, persist, present.
    async fn execute(&self, addon: &Addon, message_index: usize) -> sidecar_core::Result<()> {
        let (message_key, prompt) = {
            let chat = self.host.chat.read().await;
            let message = chat
                .get(message_index)
                .filter(|m| !m.is_user)
                .ok_or_else(|| HostError::MessageNotFound(format!("msg_{message_index}")))?;
            let key = message.key(message_index);

            let context = self.builder.build_context(
                addon,
                &chat[..=message_index],
                self.host.character.as_ref(),
                self.host.user.as_ref(),
                self.host.world.as_ref(),
            );
            (key, self.builder.build_prompt(addon, &context))
        };

        let (provider, model) = self.router.resolve_for(addon).ok_or_else(|| {
            ProviderError::NotConfigured(addon.provider.clone().unwrap_or_default())
        })?;

        let mut request = CompletionRequest::new(&model, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(addon_id = %addon.id, provider = provider.name(), model = %model, "Sending add-on request");
        let response = provider.complete(request).await?;
        let raw = response.content;

        let formatted = {
            let mut chat = self.host.chat.write().await;
            let index = position_of_key(&chat, &message_key).ok_or_else(|| {
                HostError::MessageNotFound(message_key.clone())
            })?;
            let message = &mut chat[index];
            persist(message, addon, &raw)
        };

        if let Err(e) = self.host.save_chat().await {
            warn!(addon_id = %addon.id, error = %e, "Failed to save chat after add-on result");
        }

        let shown = match addon.response_location {
            ResponseLocation::ChatHistory => {
                self.formatter
                    .inject_into_chat_history(&message_key, addon, &formatted)
                    .await
            }
            ResponseLocation::OutsideChatlog => {
                self.formatter
                    .inject_into_panel(addon, &formatted, &message_key)
                    .await
            }
        };
        if !shown {
            warn!(addon_id = %addon.id, message_key = %message_key, "Result saved but not displayed");
        }

        info!(addon = %addon.name, message_key = %message_key, "Add-on result delivered");
        Ok(())
    }
}

/// Store the raw result in the live message and return its display form.
fn persist(message: &mut ChatMessage, addon: &Addon, raw: &str) -> String {
    if !store::save_result_to_metadata(message, addon, raw) {
        warn!(addon_id = %addon.id, "Result could not be stored in the transcript");
    }

    match addon.response_location {
        ResponseLocation::ChatHistory => {
            let formatted = format_result(addon, raw, Some(&*message), false);
            store::upsert_result_block(&mut message.mes, &addon.id, &formatted);
            formatted
        }
        ResponseLocation::OutsideChatlog => format_result(addon, raw, Some(&*message), true),
    }
}

/// Index of the most recent AI message with text.
pub fn latest_ai_index(chat: &[ChatMessage]) -> Option<usize> {
    chat.iter().rposition(|m| !m.is_user && m.has_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sidecar_config::UiConfig;
    use sidecar_core::{
        AddonRegistry, ChatLog, ChatPersistence, CompletionResponse, EventBus, Provider,
        TriggerMode,
    };
    use sidecar_formatter::MemoryDom;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Replies with scripted results in order, recording every prompt.
    struct ScriptedProvider {
        replies: StdMutex<Vec<Result<String, ProviderError>>>,
        prompts: StdMutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies),
                prompts: StdMutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt);
            let mut replies = self.replies.lock().unwrap();
            assert!(!replies.is_empty(), "ScriptedProvider ran out of replies");
            replies.remove(0).map(|content| CompletionResponse {
                content,
                model: request.model,
                usage: None,
            })
        }
    }

    struct CountingPersistence(AtomicUsize);

    #[async_trait]
    impl ChatPersistence for CountingPersistence {
        async fn save_chat(&self, _chat: &ChatLog) -> Result<(), HostError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        handler: EventHandler<MemoryDom>,
        provider: Arc<ScriptedProvider>,
        saves: Arc<CountingPersistence>,
    }

    fn fixture(addons: Vec<Addon>, replies: Vec<Result<String, ProviderError>>) -> Fixture {
        let chat = vec![
            ChatMessage::user("Ann", "Tell me a story"),
            ChatMessage::character("Bot", "Once upon a time"),
        ];
        fixture_with_chat(chat, addons, replies)
    }

    fn fixture_with_chat(
        chat: Vec<ChatMessage>,
        addons: Vec<Addon>,
        replies: Vec<Result<String, ProviderError>>,
    ) -> Fixture {
        let dom = Arc::new(Mutex::new(MemoryDom::from_chat(&chat)));
        let saves = Arc::new(CountingPersistence(AtomicUsize::new(0)));
        let host = HostContext::new(chat).with_persistence(saves.clone());

        let provider = ScriptedProvider::new(replies);
        let mut router = ProviderRouter::new("scripted", "test-model");
        router.register("scripted", provider.clone());

        let handler = EventHandler::new(
            host,
            Arc::new(AddonRegistry::new(addons)),
            Arc::new(router),
            Arc::new(ResultFormatter::new(dom, UiConfig::default())),
        );
        Fixture {
            handler,
            provider,
            saves,
        }
    }

    fn received(index: usize) -> HostEvent {
        HostEvent::MessageReceived {
            message_index: index,
            timestamp: Utc::now(),
        }
    }

    async fn message_text(handler: &EventHandler<MemoryDom>, index: usize) -> String {
        handler.host().chat.read().await[index].mes.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn panel_addon_persists_and_renders() {
        let f = fixture(
            vec![Addon::new("summary", "Summary", "Summarize: {{currentMessage}}")],
            vec![Ok("A short tale".into())],
        );

        assert_eq!(f.handler.handle_event(&received(1)).await, 1);
        assert_eq!(f.provider.prompts(), vec!["Summarize: Once upon a time"]);

        let mes = message_text(&f.handler, 1).await;
        assert_eq!(store::read_stored(&mes, "summary").unwrap().as_deref(), Some("A short tale"));
        assert_eq!(f.saves.0.load(Ordering::SeqCst), 1);

        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        let slot = dom.find_by_id("addon-content-summary").unwrap();
        assert!(dom.text_content(slot).contains("A short tale"));
        assert!(dom.query_class(dom.body(), "sidecar-loading").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_history_addon_splices_transcript_and_document() {
        let addon = Addon::new("notes", "Notes", "{{lastMessages}}")
            .with_location(ResponseLocation::ChatHistory);
        let f = fixture(vec![addon], vec![Ok("Side notes".into())]);

        assert_eq!(f.handler.on_ai_message(1).await, 1);

        let mes = message_text(&f.handler, 1).await;
        assert!(mes.starts_with("Once upon a time"));
        assert!(store::has_result_block(&mes, "notes"));
        assert_eq!(store::read_stored(&mes, "notes").unwrap().as_deref(), Some("Side notes"));

        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        let element = dom.message_elements()[1];
        let area = dom.query_class(element, "mes_text").unwrap();
        assert!(dom.inner_html(area).contains("<!-- addon-result:notes -->"));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_message_gets_its_own_panel_and_block() {
        let chat = vec![
            ChatMessage::user("Ann", "Start"),
            ChatMessage::character("Bot", "First reply"),
            ChatMessage::user("Ann", "Go on"),
            ChatMessage::character("Bot", "Second reply"),
        ];
        let f = fixture_with_chat(
            chat,
            vec![
                Addon::new("summary", "Summary", "{{currentMessage}}"),
                Addon::new("notes", "Notes", "n").with_location(ResponseLocation::ChatHistory),
            ],
            vec![Ok("About the first".into()), Ok("Side notes".into())],
        );

        assert_eq!(f.handler.on_ai_message(1).await, 2);
        assert_eq!(f.provider.prompts()[0], "First reply");
        assert!(store::read_stored(&message_text(&f.handler, 1).await, "summary")
            .unwrap()
            .is_some());

        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        let elements = dom.message_elements();
        assert!(dom.has_descendant_with_class(elements[1], "addon_section-summary"));
        assert!(!dom.has_descendant_with_class(elements[3], "addon_section-summary"));

        let first = dom.query_class(elements[1], "mes_text").unwrap();
        let last = dom.query_class(elements[3], "mes_text").unwrap();
        assert!(dom.inner_html(first).contains("<!-- addon-result:notes -->"));
        assert!(!dom.inner_html(last).contains("addon-result:notes"));
    }

    #[tokio::test(start_paused = true)]
    async fn only_automatic_addons_run_on_new_messages() {
        let mut manual = Addon::new("manual", "Manual", "m");
        manual.trigger_mode = TriggerMode::Manual;
        let f = fixture(
            vec![
                Addon::new("auto", "Auto", "a"),
                manual,
                Addon::new("off", "Off", "o").disabled(),
            ],
            vec![Ok("auto result".into())],
        );

        assert_eq!(f.handler.handle_event(&received(1)).await, 1);
        assert_eq!(f.provider.prompts(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn user_messages_trigger_nothing() {
        let f = fixture(vec![Addon::new("a", "A", "p")], vec![]);
        assert_eq!(f.handler.handle_event(&received(0)).await, 0);
        assert_eq!(f.handler.handle_event(&received(9)).await, 0);
        assert!(f.provider.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn addons_run_in_declaration_order() {
        let f = fixture(
            vec![Addon::new("one", "One", "first"), Addon::new("two", "Two", "second")],
            vec![Ok("1".into()), Ok("2".into())],
        );

        assert_eq!(f.handler.on_ai_message(1).await, 2);
        assert_eq!(f.provider.prompts(), vec!["first", "second"]);
        let mes = message_text(&f.handler, 1).await;
        assert_eq!(store::stored_addon_ids(&mes), vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_shows_error_and_retry_recovers() {
        let f = fixture(
            vec![Addon::new("summary", "Summary", "p")],
            vec![
                Err(ProviderError::Network("connection reset".into())),
                Ok("recovered".into()),
            ],
        );

        assert_eq!(f.handler.on_ai_message(1).await, 0);
        let button = {
            let dom = f.handler.formatter().dom();
            let dom = dom.lock().await;
            let error = dom.query_class(dom.body(), "sidecar-error-summary").unwrap();
            assert!(dom.text_content(error).contains("connection reset"));
            dom.query_class(error, "sidecar-retry").unwrap()
        };
        assert!(store::read_stored(&message_text(&f.handler, 1).await, "summary")
            .unwrap()
            .is_none());

        let target = f.handler.formatter().retry_target(button).await.unwrap();
        let event = HostEvent::RetryRequested {
            addon_id: target.addon_id,
            message_key: target.message_key,
            timestamp: Utc::now(),
        };
        assert_eq!(f.handler.handle_event(&event).await, 1);

        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        assert!(dom.query_class(dom.body(), "sidecar-error-summary").is_none());
        let mes = message_text(&f.handler, 1).await;
        assert_eq!(store::read_stored(&mes, "summary").unwrap().as_deref(), Some("recovered"));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_runs_named_addons() {
        let mut manual = Addon::new("manual", "Manual", "by hand");
        manual.trigger_mode = TriggerMode::Manual;
        let f = fixture(
            vec![Addon::new("auto", "Auto", "a"), manual],
            vec![Ok("done".into())],
        );

        let event = HostEvent::ManualTrigger {
            addon_ids: vec!["manual".into(), "missing".into()],
            timestamp: Utc::now(),
        };
        assert_eq!(f.handler.handle_event(&event).await, 1);
        assert_eq!(f.provider.prompts(), vec!["by hand"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rerunning_keeps_one_marker() {
        let f = fixture(
            vec![Addon::new("summary", "Summary", "p")],
            vec![Ok("old".into()), Ok("new".into())],
        );

        f.handler.trigger_addons(&[]).await;
        f.handler.trigger_addons(&[]).await;

        let mes = message_text(&f.handler, 1).await;
        assert_eq!(mes.matches("sidecar-storage:summary:").count(), 1);
        assert_eq!(store::read_stored(&mes, "summary").unwrap().as_deref(), Some("new"));

        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        assert_eq!(dom.query_class_all(dom.body(), "addon_section-summary").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_provider_is_reported() {
        let mut addon = Addon::new("a", "A", "p");
        addon.provider = Some("nowhere".into());
        let f = fixture(vec![addon], vec![]);

        assert_eq!(f.handler.on_ai_message(1).await, 0);
        let dom = f.handler.formatter().dom();
        let dom = dom.lock().await;
        assert!(dom.query_class(dom.body(), "sidecar-error-a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_load_restores_stored_results() {
        let addon = Addon::new("summary", "Summary", "p");
        let f = fixture(vec![addon.clone()], vec![]);
        {
            let mut chat = f.handler.host().chat.write().await;
            store::save_result_to_metadata(&mut chat[1], &addon, "from last session");
        }

        let event = HostEvent::ChatLoaded {
            timestamp: Utc::now(),
        };
        assert_eq!(f.handler.handle_event(&event).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_drains_the_bus() {
        let f = fixture(vec![Addon::new("a", "A", "p")], vec![Ok("r".into())]);
        let bus = EventBus::new(8);
        let events = bus.subscribe();
        bus.publish(received(1));
        drop(bus);

        f.handler.run(events).await;
        assert_eq!(f.provider.prompts().len(), 1);
    }

    #[test]
    fn latest_ai_index_skips_user_and_empty() {
        let chat = vec![
            ChatMessage::character("Bot", "hi"),
            ChatMessage::character("Bot", "  "),
            ChatMessage::user("Ann", "yo"),
        ];
        assert_eq!(latest_ai_index(&chat), Some(0));
        assert_eq!(latest_ai_index(&[]), None);
    }
}
