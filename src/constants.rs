pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_USER_FIELD_LENGTH: usize = 150;

/// Ten years.
pub const MAX_SESSION_HOURS: i64 = 24 * 365 * 10;

/// Upper bound for recipe payloads, images are sent inline as data URIs.
pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

pub const CATALOG_CACHE_BIND: &str = "catalog-cache-key";

// Postgres caps bind parameters per statement at u16::MAX
pub const MAX_BIND_PARAMETERS: usize = 65535;
