//! Route paths, shared by the router and the HTTP tests.

pub const START: &str = "/start";
pub const STATUS: &str = "/status";
pub const TOP_SENDERS: &str = "/top-senders";
pub const HEALTH: &str = "/health";
