/// Application name, also the prefix of every release artifact.
pub const APP_NAME: &str = "histsync";

/// Version string used before a release has been resolved.
pub const UNKNOWN_VERSION: &str = "UNKNOWN";

/// A mailbox row is returned by `query` while its read count is below this.
pub const QUERY_READ_COUNT_LIMIT: i64 = 5;

/// Entry rows read more often than this are reclaimed by the janitor.
pub const ENTRY_GC_READ_COUNT: i64 = 10;

/// Deletion requests read more often than this are reclaimed by the janitor.
pub const DELETION_GC_READ_COUNT: i64 = 100;

/// How many predecessor tags the release resolver tries before giving up.
pub const MAX_VERSION_DECREMENTS: usize = 5;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// API routes
pub const PATH_SUBMIT: &str = "/api/v1/submit";
pub const PATH_REGISTER: &str = "/api/v1/register";
pub const PATH_BOOTSTRAP: &str = "/api/v1/bootstrap";
pub const PATH_QUERY: &str = "/api/v1/query";
pub const PATH_GET_DUMP_REQUESTS: &str = "/api/v1/get-dump-requests";
pub const PATH_SUBMIT_DUMP: &str = "/api/v1/submit-dump";
pub const PATH_ADD_DELETION_REQUEST: &str = "/api/v1/add-deletion-request";
pub const PATH_GET_DELETION_REQUESTS: &str = "/api/v1/get-deletion-requests";
pub const PATH_DOWNLOAD: &str = "/api/v1/download";
pub const PATH_BANNER: &str = "/api/v1/banner";
pub const PATH_TRIGGER_CRON: &str = "/api/v1/trigger-cron";
pub const PATH_WIPE_DB: &str = "/api/v1/wipe-db";
pub const PATH_USAGE_STATS: &str = "/internal/api/v1/usage-stats";
