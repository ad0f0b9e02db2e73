//! Process-wide wiring of clients and stores.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::connection_monitor::ConnectionMonitor;
use super::stores::{
    AgentStore, AssistantStore, AuthStore, ExecutionStore, KnowledgeStore, MultiAgentStore,
    RecorderStore, SystemStore, ToolStore, VoiceStore, WorkflowStore,
};
use crate::domain::{AppConfig, Backend, ChatEvent, Result, TokenCell};
use crate::infrastructure::{
    stream_sse, FileKeystore, LocalStorage, RequestClient, SecureTokenStore, Subscription,
};

/// One instance of every store plus the shared clients.
///
/// Built once at startup and passed to whatever needs it.
pub struct AppContext {
    pub config: AppConfig,
    pub client: RequestClient,
    pub monitor: ConnectionMonitor,
    pub auth: AuthStore,
    pub workflows: WorkflowStore,
    pub executions: Arc<ExecutionStore>,
    pub recorder: Arc<RecorderStore>,
    pub assistant: AssistantStore,
    pub voice: VoiceStore,
    pub tools: ToolStore,
    pub multi_agent: MultiAgentStore,
    pub agents: AgentStore,
    pub knowledge: KnowledgeStore,
    pub system: Arc<SystemStore>,
}

impl AppContext {
    /// Open persisted state under the configured data directory and build
    /// every store on top of it.
    pub fn open(config: AppConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| crate::domain::AppError::io("creating data directory", e))?;

        let keystore = FileKeystore::open(&config.secure_store_path())?;
        let secure = SecureTokenStore::native(Arc::new(keystore));
        let local = LocalStorage::open(&config.state_db_path())?;
        debug!(path = %data_dir.display(), "Opened local state");

        Ok(Self::build(config, secure, Some(Arc::new(local))))
    }

    /// Context with an in-memory secure store and no persisted state.
    pub fn ephemeral(config: AppConfig) -> Self {
        Self::build(config, SecureTokenStore::in_memory(), None)
    }

    fn build(
        config: AppConfig,
        secure: SecureTokenStore,
        local: Option<Arc<LocalStorage>>,
    ) -> Self {
        let token = TokenCell::default();
        let client = RequestClient::new(&config, token.clone());

        Self {
            monitor: ConnectionMonitor::new(&config, client.clone()),
            auth: AuthStore::new(client.clone(), Arc::new(secure), local, token),
            workflows: WorkflowStore::new(client.clone()),
            executions: Arc::new(ExecutionStore::new(client.clone())),
            recorder: Arc::new(RecorderStore::new(client.clone())),
            assistant: AssistantStore::new(client.clone()),
            voice: VoiceStore::new(client.clone()),
            tools: ToolStore::new(client.clone()),
            multi_agent: MultiAgentStore::new(client.clone()),
            agents: AgentStore::new(client.clone()),
            knowledge: KnowledgeStore::new(client.clone()),
            system: Arc::new(SystemStore::new(client.clone())),
            client,
            config,
        }
    }

    /// Stream an assistant reply to `message` token by token.
    pub fn stream_chat(&self, conversation_id: &str, message: &str) -> Subscription<ChatEvent> {
        let url = self
            .client
            .url(Backend::Engine, &format!("/conversations/{conversation_id}/stream"));
        let request = self
            .client
            .authorize(self.client.http().post(url))
            .json(&json!({ "message": message }));
        stream_sse(request)
    }

    /// Stop background loops owned by the context.
    pub async fn shutdown(&self) {
        self.monitor.stop_monitoring().await;
        self.system.stop_polling().await;
    }
}
