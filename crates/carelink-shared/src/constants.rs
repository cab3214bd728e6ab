use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "CareLink";

/// Inactivity window after which an authenticated session expires
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Correlation timeout for read requests (degrade to local cache on expiry)
pub const READ_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Correlation timeout for write requests (surfaced as an error on expiry)
pub const WRITE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between individual notification deliveries while draining a batch
pub const NOTIFY_DRAIN_DELAY: Duration = Duration::from_millis(300);

/// How often the socket task retries the connection while disconnected
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Well-known system channel ids, seeded on first run
pub const CHANNEL_GENERAL: &str = "general";
pub const CHANNEL_ANNOUNCEMENTS: &str = "announcements";

/// AES-256-GCM key size in bytes
pub const AES_KEY_SIZE: usize = 32;

/// AES-GCM IV size in bytes (96 bits)
pub const AES_IV_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes (128 bits)
pub const AES_TAG_SIZE: usize = 16;

/// Length of the string-based key used by the XOR fallback cipher
pub const XOR_KEY_LEN: usize = 32;

/// Placeholder text substituted when a payload cannot be decrypted
pub const DECRYPT_FAILURE_TEXT: &str = "[Encrypted message - unable to decrypt]";

/// Maximum number of audit log entries kept locally
pub const AUDIT_MAX_ENTRIES: usize = 1000;

/// Audit log retention in days
pub const AUDIT_RETENTION_DAYS: i64 = 90;
