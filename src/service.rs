//! Debate operations. `DebateService` is the composition root: it owns the
//! store, the configuration and every collaborator built from them.

use crate::analytics::{ProgressReport, ANALYTICS_WINDOW_DAYS};
use crate::analyzer::ScoreSet;
use crate::config::{self, AppConfig, FallacyMode};
use crate::db::{Database, Debate, DebateMessage, DebateStatus, LoggedFallacy, Position, Role, User};
use crate::error::{AppError, Result};
use crate::fallacies::{DelegatedClassifier, DisabledClassifier, FallacyClassifier, FallacyFinding, PatternClassifier};
use crate::llm::{ChatMessage, CompletionRequest, LlmBackend, LlmError, OpenRouterClient};
use crate::personas::{self, Persona, PersonaFileInfo};
use crate::scoring::ArgumentScorer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const OPPONENT_TEMPERATURE: f32 = 0.8;
const OPPONENT_MAX_TOKENS: u32 = 300;
const OPPONENT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub struct DebateDetail {
    pub debate: Debate,
    pub messages: Vec<DebateMessage>,
    pub fallacies: Vec<LoggedFallacy>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub user_message: DebateMessage,
    pub ai_message: DebateMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArgumentAnalysis {
    pub scores: ScoreSet,
    pub fallacies: Vec<FallacyFinding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub api_key_set: bool,
    pub api_key_preview: String,
    pub model: String,
    pub analysis_model: String,
    pub fallacy_mode: FallacyMode,
    pub request_timeout_secs: u64,
}

/// Fields left `None` keep their current value; an empty API key also keeps
/// the stored one.
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub analysis_model: Option<String>,
    pub fallacy_mode: Option<FallacyMode>,
    pub request_timeout_secs: Option<u64>,
}

pub struct DebateService {
    db: Database,
    data_dir: PathBuf,
    config: AppConfig,
    backend: Option<Arc<dyn LlmBackend>>,
    scorer: ArgumentScorer,
    classifier: Box<dyn FallacyClassifier>,
}

/// Build the chat-completion client, or `None` when no API key is configured.
pub fn build_backend(config: &AppConfig) -> Result<Option<Arc<dyn LlmBackend>>> {
    if !config.has_api_key() {
        return Ok(None);
    }
    let mut client = OpenRouterClient::new(
        &config.openrouter_api_key,
        &config.model,
        Duration::from_secs(config.request_timeout_secs.max(1)),
    )?;
    if let Some(base_url) = config.base_url.as_deref().filter(|u| !u.is_empty()) {
        client = client.with_base_url(base_url);
    }
    Ok(Some(Arc::new(client)))
}

fn build_classifier(config: &AppConfig, backend: Option<Arc<dyn LlmBackend>>) -> Box<dyn FallacyClassifier> {
    match config.fallacy_mode {
        FallacyMode::Delegated => Box::new(DelegatedClassifier::new(
            backend,
            Some(config.analysis_model().to_string()),
        )),
        FallacyMode::Patterns => Box::new(PatternClassifier),
        FallacyMode::Off => Box::new(DisabledClassifier),
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Invalid(format!("Missing required field: {}", field)));
    }
    Ok(trimmed)
}

impl DebateService {
    /// Wire the service from explicit parts. `backend` is `None` when the
    /// AI-backed features are unavailable.
    pub fn new(db: Database, data_dir: &Path, config: AppConfig, backend: Option<Arc<dyn LlmBackend>>) -> Self {
        let scorer = ArgumentScorer::new(backend.clone(), Some(config.analysis_model().to_string()));
        let classifier = build_classifier(&config, backend.clone());
        Self { db, data_dir: data_dir.to_path_buf(), config, backend, scorer, classifier }
    }

    fn rewire(&mut self, config: AppConfig, backend: Option<Arc<dyn LlmBackend>>) {
        self.scorer = ArgumentScorer::new(backend.clone(), Some(config.analysis_model().to_string()));
        self.classifier = build_classifier(&config, backend.clone());
        self.backend = backend;
        self.config = config;
    }

    /// Open `<data_dir>/database.sqlite`, load the config and build the
    /// backend it describes.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("database.sqlite");
        let db_path = db_path
            .to_str()
            .ok_or_else(|| AppError::Config(format!("data directory is not valid UTF-8: {}", data_dir.display())))?;
        let db = Database::new(db_path)?;
        let config = config::load_config(data_dir);
        let backend = build_backend(&config)?;
        info!(
            data_dir = %data_dir.display(),
            backend = backend.as_ref().map(|b| b.name()).unwrap_or("none"),
            fallacy_mode = %config.fallacy_mode,
            "debate service ready"
        );
        Ok(Self::new(db, data_dir, config, backend))
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    // ── Users ──

    pub fn register(&self, email: &str, name: &str) -> Result<User> {
        let email = required(email, "email")?;
        let name = required(name, "name")?;
        if !email.contains('@') {
            return Err(AppError::Invalid(format!("not an email address: {}", email)));
        }
        if self.db.get_user_by_email(email)?.is_some() {
            return Err(AppError::Invalid(format!("{} is already registered", email)));
        }
        let user = self.db.create_user(email, name)?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub fn login(&self, email: &str) -> Result<User> {
        let email = required(email, "email")?;
        self.db.get_user_by_email(email)?.ok_or(AppError::NotFound("user"))
    }

    // ── Debates ──

    pub fn create_debate(&self, user_id: &str, topic: &str, position: &str, opponent_type: &str) -> Result<Debate> {
        let user_id = required(user_id, "user_id")?;
        let topic = required(topic, "topic")?;
        let position: Position = required(position, "position")?.parse().map_err(AppError::Invalid)?;
        let persona = Persona::from_key(required(opponent_type, "opponent_type")?);

        if !self.db.user_exists(user_id)? {
            return Err(AppError::NotFound("user"));
        }
        let debate = self.db.create_debate(user_id, topic, position, persona.key())?;
        info!(debate_id = %debate.id, opponent = persona.key(), position = position.as_str(), "debate created");
        Ok(debate)
    }

    pub fn list_debates(&self, user_id: &str) -> Result<Vec<Debate>> {
        Ok(self.db.get_user_debates(required(user_id, "user_id")?)?)
    }

    pub fn get_debate(&self, debate_id: &str) -> Result<DebateDetail> {
        let debate = self.load_debate(debate_id)?;
        let messages = self.db.get_debate_messages(&debate.id)?;
        let fallacies = self.db.get_debate_fallacies(&debate.id)?;
        Ok(DebateDetail { debate, messages, fallacies })
    }

    fn load_debate(&self, debate_id: &str) -> Result<Debate> {
        let debate_id = required(debate_id, "debate_id")?;
        self.db.get_debate(debate_id)?.ok_or(AppError::NotFound("debate"))
    }

    /// Play one turn: analyze and store the user's argument, then stream the
    /// opponent's reply through `on_token` and store it.
    ///
    /// Nothing is stored unless the debate is active and a backend is
    /// configured.
    pub async fn send_message(
        &self,
        debate_id: &str,
        message: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<TurnOutcome> {
        let message = required(message, "message")?;
        let debate = self.load_debate(debate_id)?;
        if debate.status != DebateStatus::Active {
            return Err(AppError::Invalid(format!("debate is {}", debate.status.as_str())));
        }
        let backend = self.backend.clone().ok_or(LlmError::MissingApiKey)?;

        let history = self.db.get_debate_messages(&debate.id)?;
        let (scores, fallacies) = tokio::join!(self.scorer.score(message), self.classifier.detect(message));
        let user_message = self.db.add_user_message(&debate.id, message, &scores, &fallacies)?;
        info!(
            debate_id = %debate.id,
            overall = scores.overall(),
            fallacies = fallacies.len(),
            "user turn analyzed"
        );

        let persona = Persona::from_key(&debate.opponent_type);
        let style = persona.load_prompt(&self.data_dir);
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|m| match m.role {
                Role::User => ChatMessage::user(m.content.as_str()),
                Role::Assistant => ChatMessage::assistant(m.content.as_str()),
            })
            .collect();
        messages.push(ChatMessage::user(message));

        let request = CompletionRequest {
            system: personas::opponent_system_prompt(persona, &style, &debate.topic, debate.position),
            messages,
            temperature: OPPONENT_TEMPERATURE,
            max_tokens: OPPONENT_MAX_TOKENS,
            model: None,
        };
        let reply = stream_with_retry(backend.as_ref(), request, OPPONENT_MAX_RETRIES, on_token).await?;

        let ai_message = self.db.add_assistant_message(&debate.id, reply.trim())?;
        self.db.increment_turn_count(&debate.id)?;
        Ok(TurnOutcome { user_message, ai_message })
    }

    /// Mark the debate completed. Ending a debate that is no longer active
    /// leaves it unchanged.
    pub fn end_debate(&self, debate_id: &str) -> Result<Debate> {
        let debate = self.load_debate(debate_id)?;
        if debate.status != DebateStatus::Active {
            return Ok(debate);
        }
        self.db.complete_debate(&debate.id)?;
        info!(debate_id = %debate.id, turns = debate.turn_count, "debate completed");
        self.load_debate(&debate.id)
    }

    // ── Analysis ──

    pub fn progress(&self, user_id: &str) -> Result<ProgressReport> {
        let user_id = required(user_id, "user_id")?;
        let analytics = self.db.get_user_analytics(user_id, ANALYTICS_WINDOW_DAYS)?;
        Ok(ProgressReport::from_analytics(analytics, ANALYTICS_WINDOW_DAYS))
    }

    /// Score and screen an argument without storing anything.
    pub async fn analyze_argument(&self, argument: &str) -> ArgumentAnalysis {
        let (scores, fallacies) = tokio::join!(self.scorer.score(argument), self.classifier.detect(argument));
        ArgumentAnalysis { scores, fallacies }
    }

    // ── Settings ──

    pub fn get_settings(&self) -> SettingsResponse {
        SettingsResponse {
            api_key_set: self.config.has_api_key(),
            api_key_preview: self.config.api_key_preview(),
            model: self.config.model.clone(),
            analysis_model: self.config.analysis_model().to_string(),
            fallacy_mode: self.config.fallacy_mode,
            request_timeout_secs: self.config.request_timeout_secs,
        }
    }

    /// Persist the new settings and rebuild the collaborators that depend on them.
    pub fn save_settings(&mut self, update: SettingsUpdate) -> Result<SettingsResponse> {
        let mut next = self.config.clone();
        if let Some(key) = update.api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            next.openrouter_api_key = key;
        }
        if let Some(model) = update.model {
            next.model = required(&model, "model")?.to_string();
        }
        if let Some(analysis_model) = update.analysis_model {
            next.analysis_model = analysis_model.trim().to_string();
        }
        if let Some(mode) = update.fallacy_mode {
            next.fallacy_mode = mode;
        }
        if let Some(secs) = update.request_timeout_secs {
            next.request_timeout_secs = secs;
        }

        config::save_config(&self.data_dir, &next)?;
        let backend = build_backend(&next)?;
        self.rewire(next, backend);
        info!(fallacy_mode = %self.config.fallacy_mode, backend = self.has_backend(), "settings updated");
        Ok(self.get_settings())
    }

    // ── Personas ──

    pub fn get_persona_files(&self) -> Result<Vec<PersonaFileInfo>> {
        personas::read_all_persona_files(&self.data_dir)
    }

    pub fn update_persona_file(&self, filename: &str, content: &str) -> Result<()> {
        personas::write_persona_file(&self.data_dir, filename, content)
    }
}

/// Stream a completion, retrying transient failures `max_retries` times one
/// second apart.
async fn stream_with_retry(
    backend: &dyn LlmBackend,
    request: CompletionRequest,
    max_retries: u32,
    on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match backend.stream(request.clone(), on_token).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => {
                warn!(attempt, "opponent returned an empty reply");
                if attempt >= max_retries {
                    return Err(LlmError::InvalidResponse("empty reply".to_string()).into());
                }
            }
            Err(e) if e.is_transient() && attempt < max_retries => {
                warn!(attempt, error = %e, "opponent reply failed, retrying");
            }
            Err(e) => return Err(e.into()),
        }
        attempt += 1;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::SkillLevel;
    use crate::analyzer::analyze;
    use crate::fallacies::FallacyKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Answers scoring and fallacy prompts with fixed replies and plays the
    /// opponent from a queue, so concurrent analysis calls can't race for
    /// scripted replies.
    struct RoutingBackend {
        scores: String,
        fallacies: String,
        opponent: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
        opponent_requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RoutingBackend {
        fn new(scores: &str, fallacies: &str, opponent: Vec<std::result::Result<String, LlmError>>) -> Self {
            Self {
                scores: scores.to_string(),
                fallacies: fallacies.to_string(),
                opponent: Mutex::new(opponent.into()),
                opponent_requests: Mutex::new(Vec::new()),
            }
        }

        fn opponent_calls(&self) -> usize {
            self.opponent_requests.lock().expect("requests lock").len()
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for RoutingBackend {
        fn name(&self) -> &str {
            "routing"
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, LlmError> {
            if request.system.contains("debate analyst") {
                return Ok(self.scores.clone());
            }
            if request.system.contains("logical fallacies") {
                return Ok(self.fallacies.clone());
            }
            self.opponent_requests.lock().expect("requests lock").push(request);
            self.opponent
                .lock()
                .expect("opponent lock")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Network("script exhausted".to_string())))
        }
    }

    const SCORES_REPLY: &str = r#"{"clarity": 80, "evidence": 75, "logic": 70, "persuasiveness": 65}"#;
    const FALLACY_REPLY: &str =
        r#"[{"type": "Appeal to Emotion", "description": "Leans on fear", "severity": "medium"}]"#;

    fn service_with(backend: Option<Arc<dyn LlmBackend>>, mode: FallacyMode) -> (TempDir, DebateService) {
        let dir = tempdir().expect("temp directory should exist");
        let db = Database::new(":memory:").expect("in-memory database should initialize");
        let config = AppConfig { fallacy_mode: mode, ..AppConfig::default() };
        let service = DebateService::new(db, dir.path(), config, backend);
        (dir, service)
    }

    fn user_and_debate(service: &DebateService, position: &str) -> (User, Debate) {
        let user = service.register("ada@example.com", "Ada").expect("user should register");
        let debate = service
            .create_debate(&user.id, "Nuclear power is the future", position, "scientist")
            .expect("debate should be created");
        (user, debate)
    }

    #[tokio::test]
    async fn e2e_debate_turns_analytics_and_completion() {
        let backend = Arc::new(RoutingBackend::new(
            SCORES_REPLY,
            FALLACY_REPLY,
            vec![Ok("Counterpoint one.".to_string()), Ok("Counterpoint two.".to_string())],
        ));
        let (_dir, service) = service_with(Some(backend.clone()), FallacyMode::Delegated);
        let (user, debate) = user_and_debate(&service, "for");

        let mut streamed = String::new();
        let turn = service
            .send_message(&debate.id, "Imagine the meltdowns we avoid by building reactors.", &mut |t: &str| {
                streamed.push_str(t)
            })
            .await
            .expect("first turn should succeed");
        assert_eq!(streamed, "Counterpoint one.");
        assert_eq!(turn.ai_message.content, "Counterpoint one.");
        assert_eq!(turn.user_message.scores, Some(ScoreSet::from_parts(80, 75, 70, 65)));
        let findings = turn.user_message.fallacies.as_deref().expect("user turn carries findings");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FallacyKind::AppealToEmotion);

        service
            .send_message(&debate.id, "Reactors also run for sixty years.", &mut |_: &str| {})
            .await
            .expect("second turn should succeed");

        {
            let requests = backend.opponent_requests.lock().expect("requests lock");
            assert!(requests[0].system.contains("You are arguing AGAINST this statement."));
            assert!(requests[0].system.contains(Persona::Scientist.default_prompt()));
            assert_eq!(requests[0].messages.len(), 1);
            let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
            assert_eq!(roles, vec!["user", "assistant", "user"]);
            assert_eq!(requests[1].temperature, OPPONENT_TEMPERATURE);
        }

        let detail = service.get_debate(&debate.id).expect("debate should load");
        assert_eq!(detail.debate.turn_count, 2);
        assert_eq!(detail.messages.len(), 4);
        assert_eq!(detail.messages[3].content, "Counterpoint two.");
        assert_eq!(detail.fallacies.len(), 2);

        let report = service.progress(&user.id).expect("progress should load");
        assert_eq!(report.analytics.total_debates, 1);
        assert_eq!(report.analytics.total_fallacies, 2);
        assert_eq!(report.analytics.average_scores.overall, 73.0);
        assert_eq!(report.skill_level, SkillLevel::Advanced);
        assert_eq!(report.tips[0].title, "Keep Up the Great Work!");

        let ended = service.end_debate(&debate.id).expect("debate should end");
        assert_eq!(ended.status, DebateStatus::Completed);
        assert!(ended.completed_at.is_some());
        let again = service.end_debate(&debate.id).expect("ending twice is harmless");
        assert_eq!(again.completed_at, ended.completed_at);

        let err = service
            .send_message(&debate.id, "One more point", &mut |_: &str| {})
            .await
            .expect_err("completed debates take no turns");
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn e2e_send_message_without_backend_stores_nothing() {
        let (_dir, service) = service_with(None, FallacyMode::Delegated);
        let (_, debate) = user_and_debate(&service, "against");

        let err = service
            .send_message(&debate.id, "A perfectly fine argument.", &mut |_: &str| {})
            .await
            .expect_err("turns need a backend");
        assert!(matches!(err, AppError::Llm(LlmError::MissingApiKey)));

        let detail = service.get_debate(&debate.id).expect("debate should load");
        assert!(detail.messages.is_empty());
        assert_eq!(detail.debate.turn_count, 0);
    }

    #[tokio::test]
    async fn integration_opponent_retries_transient_failures_only() {
        let backend = Arc::new(RoutingBackend::new(
            SCORES_REPLY,
            "[]",
            vec![Err(LlmError::Network("connection reset".to_string())), Ok("Recovered.".to_string())],
        ));
        let (_dir, service) = service_with(Some(backend.clone()), FallacyMode::Delegated);
        let (_, debate) = user_and_debate(&service, "for");

        let turn = service
            .send_message(&debate.id, "Reactors are safe.", &mut |_: &str| {})
            .await
            .expect("turn should succeed after a retry");
        assert_eq!(turn.ai_message.content, "Recovered.");
        assert_eq!(backend.opponent_calls(), 2);
        assert_eq!(turn.user_message.fallacies.as_deref(), Some(&[][..]));

        let backend = Arc::new(RoutingBackend::new(
            SCORES_REPLY,
            "[]",
            vec![Err(LlmError::Api { status: 401, message: "Invalid API key".to_string() })],
        ));
        let (_dir, service) = service_with(Some(backend.clone()), FallacyMode::Delegated);
        let (_, debate) = user_and_debate(&service, "for");

        let err = service
            .send_message(&debate.id, "Reactors are safe.", &mut |_: &str| {})
            .await
            .expect_err("auth failures are not retried");
        assert!(matches!(err, AppError::Llm(LlmError::Api { status: 401, .. })));
        assert_eq!(backend.opponent_calls(), 1);

        let detail = service.get_debate(&debate.id).expect("debate should load");
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.debate.turn_count, 0);
    }

    #[test]
    fn unit_validation_and_lookup_errors() {
        let (_dir, service) = service_with(None, FallacyMode::Off);
        let (user, _) = user_and_debate(&service, "for");

        assert!(matches!(service.register("ada@example.com", "Ada again"), Err(AppError::Invalid(_))));
        assert!(matches!(service.register("not-an-email", "Bob"), Err(AppError::Invalid(_))));
        assert!(matches!(service.register("bob@example.com", "  "), Err(AppError::Invalid(_))));
        assert_eq!(service.login("ada@example.com").expect("login should succeed").id, user.id);
        assert!(matches!(service.login("nobody@example.com"), Err(AppError::NotFound("user"))));

        assert!(matches!(service.create_debate(&user.id, "", "for", "lawyer"), Err(AppError::Invalid(_))));
        assert!(matches!(service.create_debate(&user.id, "Topic", "sideways", "lawyer"), Err(AppError::Invalid(_))));
        assert!(matches!(service.create_debate("ghost", "Topic", "for", "lawyer"), Err(AppError::NotFound("user"))));
        assert!(matches!(service.get_debate("missing"), Err(AppError::NotFound("debate"))));
        assert!(matches!(service.end_debate("missing"), Err(AppError::NotFound("debate"))));

        let debate = service
            .create_debate(&user.id, "Topic", "Against", "astronaut")
            .expect("unknown personas fall back");
        assert_eq!(debate.opponent_type, "politician");
        assert_eq!(debate.position, Position::Against);
        assert_eq!(service.list_debates(&user.id).expect("debates should list").len(), 2);
    }

    #[tokio::test]
    async fn unit_analyze_argument_offline_uses_heuristics_and_patterns() {
        let (_dir, service) = service_with(None, FallacyMode::Patterns);
        let text = "You are an idiot, and everyone knows it.";

        let analysis = service.analyze_argument(text).await;
        assert_eq!(analysis.scores, analyze(text));
        let kinds: Vec<FallacyKind> = analysis.fallacies.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FallacyKind::AdHominem, FallacyKind::AppealToAuthority]);

        let (_dir, service) = service_with(None, FallacyMode::Delegated);
        assert!(service.analyze_argument(text).await.fallacies.is_empty());
    }

    #[test]
    fn integration_save_settings_persists_and_rewires() {
        let (dir, mut service) = service_with(None, FallacyMode::Delegated);
        assert!(!service.get_settings().api_key_set);

        let settings = service
            .save_settings(SettingsUpdate {
                api_key: Some("sk-or-v1-abcdef1234".to_string()),
                fallacy_mode: Some(FallacyMode::Patterns),
                ..SettingsUpdate::default()
            })
            .expect("settings should save");
        assert!(settings.api_key_set);
        assert_eq!(settings.api_key_preview, "sk-o...1234");
        assert_eq!(settings.fallacy_mode, FallacyMode::Patterns);
        assert!(service.has_backend());

        let settings = service
            .save_settings(SettingsUpdate {
                api_key: Some(String::new()),
                analysis_model: Some("anthropic/claude-3-haiku".to_string()),
                ..SettingsUpdate::default()
            })
            .expect("settings should save");
        assert_eq!(settings.api_key_preview, "sk-o...1234");
        assert_eq!(settings.analysis_model, "anthropic/claude-3-haiku");

        let on_disk = config::load_config(dir.path());
        assert_eq!(on_disk.openrouter_api_key, "sk-or-v1-abcdef1234");
        assert_eq!(on_disk.fallacy_mode, FallacyMode::Patterns);

        assert!(matches!(
            service.save_settings(SettingsUpdate { model: Some(" ".to_string()), ..SettingsUpdate::default() }),
            Err(AppError::Invalid(_))
        ));
    }

    #[test]
    fn integration_persona_files_through_service() {
        let (_dir, service) = service_with(None, FallacyMode::Off);
        let files = service.get_persona_files().expect("persona files should load");
        assert_eq!(files.len(), 6);

        service
            .update_persona_file("journalist.md", "You fact-check every sentence.")
            .expect("update should succeed");
        let files = service.get_persona_files().expect("persona files should load");
        let journalist = files.iter().find(|f| f.filename == "journalist.md").expect("journalist file");
        assert_eq!(journalist.content, "You fact-check every sentence.");
    }
}
