/// Application name
pub const APP_NAME: &str = "Convo";

/// Maximum number of invitees on an event, owner included
pub const MAX_EVENT_INVITEES: usize = 300;

/// Maximum number of contacts a user can keep
pub const MAX_CONTACTS: usize = 50;

/// Number of recent messages quoted in a thread email
pub const THREAD_EMAIL_CONTEXT: usize = 5;

/// Length of the plaintext preview shown by mail clients
pub const EMAIL_PREVIEW_CHARS: usize = 200;

/// Maximum length of the slug part of a reply address
pub const SLUG_MAX_LEN: usize = 20;

/// Page size used when a request asks for size 0
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// bcrypt work factor for password digests
pub const BCRYPT_COST: u32 = 10;

/// Random bytes in a session token (256 bits)
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Minimum password length accepted at signup / reset
pub const MIN_PASSWORD_LEN: usize = 8;

/// An event is "upcoming" when it starts between these offsets from now
pub const UPCOMING_WINDOW_START_HOURS: i64 = 6;
pub const UPCOMING_WINDOW_END_HOURS: i64 = 30;

/// Default reply domains
pub const THREAD_MAIL_DOMAIN: &str = "mail.hiconvo.com";
pub const EVENT_MAIL_DOMAIN: &str = "mail.convo.events";

/// Magic links stop verifying after this many hours
pub const MAGIC_LINK_TTL_HOURS: i64 = 24;

/// Display name substituted for users that no longer exist
pub const PLACEHOLDER_USER_NAME: &str = "Deleted user";
