// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9091;
pub const FIRST_FACTOR_PATH: &str = "firstfactor";
pub const API_PATH: &str = "api";

// Timing attack mitigation defaults
pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 10;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MINIMUM_DELAY_MS: u64 = 250;
pub const DEFAULT_MAXIMUM_RANDOM_DELAY_MS: u64 = 85;

// Regulation defaults
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_FIND_TIME_SECS: u64 = 120;
pub const DEFAULT_BAN_TIME_SECS: u64 = 300;
pub const DEFAULT_MAX_TRACKED_USERS: usize = 10_000;

// Session defaults
pub const DEFAULT_SESSION_COOKIE: &str = "auth_gate_session";
pub const DEFAULT_SESSION_EXPIRATION_SECS: u64 = 3600;
pub const DEFAULT_REMEMBER_ME_SECS: u64 = 2_592_000;

// Client-visible replies
pub const AUTHENTICATION_FAILED_MESSAGE: &str = "Authentication failed. Check your credentials.";
pub const USER_BANNED_MESSAGE_PREFIX: &str = "Authentication failed. Please retry after";
