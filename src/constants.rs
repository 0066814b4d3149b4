/// Constants module to avoid magic numbers in the codebase

// Upstream completion backend
pub const DEFAULT_COMPLETION_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: usize = 2000;
pub const DEFAULT_API_KEY_ENV: &str = "COMPLETION_API_KEY";
pub const CORE_PROMPT_ENV: &str = "CORE_PROMPT";
pub const CONFIG_ENV_PREFIX: &str = "PAYCHAT_";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

// Context window
pub const DEFAULT_CONTEXT_WINDOW: usize = 1; // prior exchanges
pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 4; // system + exchange + prompt

// Access proofs
pub const MIN_PROOF_LEN: usize = 8;
pub const MAX_PROOF_LEN: usize = 2048;

// Persisted state
pub const SNAPSHOT_KEY: &str = "conversation";
pub const ACCESS_KEY: &str = "access";
pub const DEFAULT_EXPLORER_URL: &str = "https://whatsonchain.com/tx/";

// Relay endpoint
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8888;
pub const DEFAULT_MAX_BODY_BYTES: usize = 65_536;
pub const SERVER_TIMEOUT_MARGIN_SECS: u64 = 30; // added on top of upstream.timeout_secs
