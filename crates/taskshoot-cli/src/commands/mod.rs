pub mod auth;
pub mod calendars;
pub mod sync;

/// Owner used when none is given on the command line.
pub const DEFAULT_OWNER: &str = "default";

pub fn owner_or_default(owner: Option<String>) -> String {
    owner.unwrap_or_else(|| DEFAULT_OWNER.to_string())
}
