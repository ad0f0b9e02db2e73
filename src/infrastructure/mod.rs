//! Infrastructure layer - external adapters (HTTP, sockets, storage).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod http_client;
pub mod local_storage;
pub mod secure_store;
pub mod sse_client;
pub mod subscription;
pub mod ws_client;

pub use config::{default_config_path, ensure_config_exists, load_config};
pub use http_client::{RequestClient, RequestOptions};
pub use local_storage::{LocalStorage, SESSION_STATE_KEY};
pub use secure_store::{FileKeystore, SecureStorageBridge, SecureTokenStore};
pub use sse_client::stream_sse;
pub use subscription::{Listener, StreamSignal, Subscription};
pub use ws_client::{connect_ws, RECORDER_WS_PATH, WORKFLOW_WS_PATH};
