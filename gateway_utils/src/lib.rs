pub mod cancellation_token;
pub mod logger;
pub mod time;

pub const OPERATION_CANCELED_MSG: &str = "Operation was cancelled";

pub fn nothing_to_do() {}
